//! Small deterministic hash primitives shared by the feature-hash embedder
//! and the LSH backend.

pub(crate) fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

pub(crate) const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Uniform value in `[-1, 1)` drawn from the splitmix64 stream.
pub(crate) fn unit_signed(state: &mut u64) -> f32 {
    let bits = splitmix64(state);
    let high = (bits >> 32) as u32;
    let mantissa = high >> 9;
    let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
    unit.mul_add(2.0, -1.0)
}
