//! `numeric` as decimal text
//!
//! PostgreSQL numerics carry arbitrary precision plus the special values
//! `NaN` and `±Infinity`, so they are rendered straight from the binary wire
//! format instead of going through a fixed-width decimal type.
//!
//! Wire layout (all big-endian): `ndigits: i16`, `weight: i16`, `sign: u16`,
//! `dscale: u16`, then `ndigits` base-10000 digits. Digit `k` carries weight
//! `weight - k`.

use std::error::Error;
use std::fmt;

use tokio_postgres::types::{FromSql, Type};

const SIGN_POS: u16 = 0x0000;
const SIGN_NEG: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_PINF: u16 = 0xD000;
const SIGN_NINF: u16 = 0xF000;

const NBASE: u16 = 10_000;

/// A `numeric` value rendered the way PostgreSQL prints it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericText(String);

impl NumericText {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NumericText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        decode(raw).map(NumericText)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn read_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([raw[at], raw[at + 1]])
}

fn decode(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    if raw.len() < 8 {
        return Err(format!("numeric value too short: {} bytes", raw.len()).into());
    }

    let ndigits = usize::from(read_u16(raw, 0));
    let weight = i32::from(read_u16(raw, 2) as i16);
    let sign = read_u16(raw, 4);
    let dscale = usize::from(read_u16(raw, 6));

    match sign {
        SIGN_NAN => return Ok("NaN".to_string()),
        SIGN_PINF => return Ok("Infinity".to_string()),
        SIGN_NINF => return Ok("-Infinity".to_string()),
        SIGN_POS | SIGN_NEG => {}
        other => return Err(format!("invalid numeric sign: {other:#06x}").into()),
    }

    let body = &raw[8..];
    if body.len() != ndigits * 2 {
        return Err(format!(
            "numeric digit count mismatch: header says {ndigits}, body holds {} bytes",
            body.len()
        )
        .into());
    }

    let digits = body
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect::<Vec<_>>();
    if let Some(bad) = digits.iter().find(|digit| **digit >= NBASE) {
        return Err(format!("invalid numeric digit: {bad}").into());
    }

    let digit_at = |k: i32| -> u16 {
        usize::try_from(k)
            .ok()
            .and_then(|k| digits.get(k).copied())
            .unwrap_or(0)
    };

    let mut out = String::with_capacity(ndigits * 4 + dscale + 2);
    if sign == SIGN_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit_at(0).to_string());
        for k in 1..=weight {
            out.push_str(&format!("{:04}", digit_at(k)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut k = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(k)));
            k += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}
