// src/utils/difficulty.rs
//! Difficulty conversion arithmetic
//!
//! Pool jobs encode their required difficulty as a 4-byte little-endian
//! "hash target"; found hashes are graded by the difficulty they achieve.
//! Both conversions divide out of the fixed 32-bit / 64-bit ceilings.

const TARGET_CEILING: u64 = 0xFFFF_FFFF;

/// Converts a job's 4-byte hex target into its integer difficulty.
///
/// Returns 0 for malformed or zero targets; callers treat such jobs as
/// unmineable.
pub fn target_to_difficulty(target_hex: &str) -> u64 {
    let bytes = match hex::decode(target_hex) {
        Ok(b) => b,
        Err(e) => {
            log::error!("Couldn't decode hex target {}: {}", target_hex, e);
            return 0;
        }
    };
    if bytes.len() != 4 {
        log::error!("Unexpected target length: {}", target_hex);
        return 0;
    }
    let t = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64;
    if t == 0 {
        return 0;
    }
    TARGET_CEILING / t
}

/// Converts a difficulty back into its 4-byte hex target encoding.
///
/// Due to the truncated encoding, `target_to_difficulty(hash_target(d))`
/// rounds `d` to the nearest representable boundary.
pub fn hash_target(difficulty: u64) -> String {
    if difficulty == 0 {
        return String::new();
    }
    let t = (TARGET_CEILING / difficulty) as u32;
    hex::encode(t.to_le_bytes())
}

/// Grades a 32-byte hash by the difficulty it achieves.
///
/// The hash is interpreted as a 256-bit little-endian value; only the most
/// significant 64 bits participate, which is exact for every difficulty a
/// 4-byte target can express.
pub fn hash_difficulty(hash: &[u8; 32]) -> u64 {
    let top = u64::from_le_bytes([
        hash[24], hash[25], hash[26], hash[27], hash[28], hash[29], hash[30], hash[31],
    ]);
    if top == 0 {
        return u64::MAX;
    }
    u64::MAX / top
}

/// Tests whether a hash meets the given difficulty.
pub fn hash_meets_difficulty(hash: &[u8; 32], difficulty: u64) -> bool {
    hash_difficulty(hash) >= difficulty
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn target_round_trips_through_difficulty() {
        // 0xFFFFFFFF / 10000 = 429496, encoded back as its LE bytes.
        assert_eq!(hash_target(10000), "b88d0600");
        assert_eq!(target_to_difficulty(&hash_target(10000)), 10000);
        // Difficulties already on a representable boundary survive exactly.
        let d = target_to_difficulty("b88d0600");
        assert_eq!(target_to_difficulty(&hash_target(d)), d);
    }

    #[test]
    fn zero_and_malformed_targets_yield_zero() {
        assert_eq!(target_to_difficulty("00000000"), 0);
        assert_eq!(target_to_difficulty("zz"), 0);
        assert_eq!(target_to_difficulty("ffffff"), 0);
        assert_eq!(hash_target(0), "");
    }

    #[test]
    fn max_target_is_difficulty_one() {
        assert_eq!(target_to_difficulty("ffffffff"), 1);
    }

    #[test]
    fn hash_difficulty_orders_hashes() {
        // Top word 0x7fffffffffffffff: difficulty 2.
        let easy = hex!(
            "ffffffffffffffffffffffffffffffff"
            "ffffffffffffffffffffffffffffff7f"
        );
        // Top word 1: near-maximal difficulty.
        let hard = hex!(
            "00000000000000000000000000000000"
            "00000000000000000100000000000000"
        );
        assert!(hash_difficulty(&hard) > hash_difficulty(&easy));
        assert!(hash_meets_difficulty(&hard, 1_000_000));
        assert!(!hash_meets_difficulty(&easy, 1_000_000));
    }

    #[test]
    fn all_zero_hash_is_maximal() {
        let zero = [0u8; 32];
        assert_eq!(hash_difficulty(&zero), u64::MAX);
    }
}
