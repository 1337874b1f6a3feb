//! Hash-function coefficient region: `A`, `b`, `r1`, `r2` in that order.

use super::header::{SerialHeader, HEADER_SIZE};
use super::serial_file::{Access, SerialFile};
use crate::hash::HashFunctionFamily;
use crate::{LshError, Result};

/// Encode the coefficients of `family` as little-endian words.
pub fn encode(family: &HashFunctionFamily) -> Vec<u8> {
    let words = family.projections().len()
        + family.biases().len()
        + family.r1().len()
        + family.r2().len();
    let mut buf = Vec::with_capacity(words * 4);
    for x in family.projections().iter().chain(family.biases()) {
        buf.extend_from_slice(&x.to_le_bytes());
    }
    for x in family.r1().iter().chain(family.r2()) {
        buf.extend_from_slice(&x.to_le_bytes());
    }
    buf
}

/// Rebuild the family recorded by `header` from its encoded region.
pub fn decode(header: &SerialHeader, buf: &[u8]) -> Result<HashFunctionFamily> {
    let shape = header.shape();
    let n_a = shape.num_projections() * shape.dim;
    let n_b = shape.num_projections();
    let n_r = shape.num_fold_coefficients();
    let need = (n_a + n_b + 2 * n_r) * 4;
    if buf.len() < need {
        return Err(LshError::Format(format!(
            "hash function region truncated: {} of {need} bytes",
            buf.len()
        )));
    }

    let mut words = buf.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]);
    let mut take_f32 = |n: usize| -> Vec<f32> { words.by_ref().take(n).map(f32::from_le_bytes).collect() };
    let projections = take_f32(n_a);
    let biases = take_f32(n_b);
    let mut take_u32 = |n: usize| -> Vec<u32> { words.by_ref().take(n).map(u32::from_le_bytes).collect() };
    let r1 = take_u32(n_r);
    let r2 = take_u32(n_r);

    HashFunctionFamily::from_coefficients(&header.params(), header.seed, projections, biases, r1, r2)
}

pub fn write(file: &SerialFile, header: &SerialHeader, family: &HashFunctionFamily) -> Result<()> {
    let bytes = encode(family);
    let mut map = file.map_mut(HEADER_SIZE as u64, bytes.len() as u64, Access::Sequential)?;
    map.copy_from_slice(&bytes);
    map.flush()?;
    tracing::debug!(
        bytes = bytes.len(),
        region = header.function_region_size(),
        "wrote hash functions"
    );
    Ok(())
}

pub fn read(file: &SerialFile, header: &SerialHeader) -> Result<HashFunctionFamily> {
    let map = file.map(HEADER_SIZE as u64, header.function_region_size(), Access::Sequential)?;
    decode(header, &map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{HashComposition, LshParams};
    use crate::persistence::header::SerialFormat;

    fn round_trip(params: LshParams) {
        let params = params.validate().unwrap();
        let family = HashFunctionFamily::new(&params);
        let header = SerialHeader::new(&params, SerialFormat::Format1, family.seed(), None, 0);
        let bytes = encode(&family);
        assert_eq!(bytes.len() as u64, header.function_region_size());

        let back = decode(&header, &bytes).unwrap();
        assert_eq!(back.projections(), family.projections());
        assert_eq!(back.biases(), family.biases());
        assert_eq!(back.r1(), family.r1());
        assert_eq!(back.r2(), family.r2());

        let v: Vec<f32> = (0..params.dim).map(|i| (i as f32 * 0.7).cos()).collect();
        assert_eq!(back.hash_keys(&v).unwrap(), family.hash_keys(&v).unwrap());
    }

    #[test]
    fn test_independent_region() {
        round_trip(LshParams::new(2.0, 4, 3, 8).with_rows(128, 4).with_seed(1));
    }

    #[test]
    fn test_pairwise_region() {
        round_trip(
            LshParams::new(2.0, 6, 4, 5)
                .with_rows(128, 4)
                .with_composition(HashComposition::Pairwise)
                .with_seed(2),
        );
    }

    #[test]
    fn test_truncated_region() {
        let params = LshParams::new(2.0, 4, 3, 8).with_seed(3).validate().unwrap();
        let family = HashFunctionFamily::new(&params);
        let header = SerialHeader::new(&params, SerialFormat::Format1, family.seed(), None, 0);
        let bytes = encode(&family);
        let err = decode(&header, &bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, LshError::Format(_)));
    }
}
