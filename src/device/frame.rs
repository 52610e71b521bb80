//! Decoding of the text lines pushed by the sensor board.
//!
//! Every notification carries one line `x, y, z, height`: the accelerometer
//! reading on three axes followed by the barometric height.

use std::str;

use crate::device::types::SensorSample;
use crate::error::DecodeError;

const FIELD_COUNT: usize = 4;

/// Decodes one notification payload into a sample.
///
/// The whole payload is rejected if it does not hold exactly four decimal
/// numbers; a partial sample is never produced.
pub fn decode(payload: &[u8]) -> Result<SensorSample, DecodeError> {
    let line = str::from_utf8(payload).map_err(|_| DecodeError::Malformed)?;
    // the board pads short values with NUL bytes and some firmware terminates lines
    let line = line
        .trim_end_matches('\0')
        .trim_end_matches('\n')
        .trim_end_matches('\r');

    let mut values = [0.0_f32; FIELD_COUNT];
    let mut count = 0;

    for token in line.split(',') {
        if count == FIELD_COUNT {
            return Err(DecodeError::Malformed);
        }

        values[count] = token.trim().parse::<f32>().map_err(|_| DecodeError::Malformed)?;
        count += 1;
    }

    if count != FIELD_COUNT {
        return Err(DecodeError::Malformed);
    }

    let [x, y, z, height] = values;
    Ok(SensorSample { x, y, z, height })
}
