// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Offline packet tool: encode/decode signal packets without a browser.
//!
//! ```text
//! packet encode-offer  <roomCode> <passphrase>   payload JSON on stdin -> packet text on stdout
//! packet encode-answer <roomCode> <passphrase>
//! packet decode-offer  <roomCode> <passphrase>   packet text on stdin -> payload JSON on stdout
//! packet decode-answer <roomCode> <passphrase>
//! ```

use anyhow::{bail, Context, Result};
use meetlink::core::codec::envelope::{
    decode_packet, decrypt_answer, decrypt_offer, encode_answer, encode_offer,
};
use meetlink::core::types::{now_ms, AnswerPayload, OfferPayload};
use std::io::Read;

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
    Ok(buf)
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(cmd), Some(room), Some(pass)) = (args.next(), args.next(), args.next()) else {
        bail!("usage: packet <encode-offer|encode-answer|decode-offer|decode-answer> <roomCode> <passphrase>");
    };
    let input = read_stdin()?;
    let now = now_ms();

    match cmd.as_str() {
        "encode-offer" => {
            let payload: OfferPayload = serde_json::from_str(&input).context("offer JSON")?;
            println!("{}", encode_offer(&payload, &room, &pass, now)?);
        }
        "encode-answer" => {
            let payload: AnswerPayload = serde_json::from_str(&input).context("answer JSON")?;
            println!("{}", encode_answer(&payload, &room, &pass, now)?);
        }
        "decode-offer" => {
            let envelope = decode_packet(&input)?;
            let payload = decrypt_offer(&envelope, &room, &pass, now)?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        "decode-answer" => {
            let envelope = decode_packet(&input)?;
            let payload = decrypt_answer(&envelope, &room, &pass, now)?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        other => bail!("unknown command: {other}"),
    }
    Ok(())
}
