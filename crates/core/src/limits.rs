//! Size and configuration bounds enforced at store/handle-registry
//! construction time.
//!
//! These are the numeric invariants on store name length, slot length
//! bounds, and the registry hash-mod partition count. Violating one of
//! these is a configuration error the caller
//! can fix, never a storage fault — so validation happens once, at
//! construction, rather than being threaded through every operation.

/// Minimum number of items per B-tree node.
pub const MIN_SLOT_LENGTH: usize = 2;
/// Maximum number of items per B-tree node.
pub const MAX_SLOT_LENGTH: usize = 10_000;
/// Practical default slot length used when a store doesn't specify one.
pub const DEFAULT_SLOT_LENGTH: usize = 500;

/// Minimum store name length, in bytes.
pub const MIN_STORE_NAME_LEN: usize = 1;
/// Maximum store name length, in bytes.
pub const MAX_STORE_NAME_LEN: usize = 128;

/// Minimum number of registry segment files (`mod` buckets).
pub const MIN_REGISTRY_HASH_MOD: u32 = 1;
/// Maximum number of registry segment files.
pub const MAX_REGISTRY_HASH_MOD: u32 = 65_536;

/// Validate a store's slot length (`2 <= S <= 10000`).
pub fn validate_slot_length(slot_length: usize) -> Result<(), String> {
    if !(MIN_SLOT_LENGTH..=MAX_SLOT_LENGTH).contains(&slot_length) {
        return Err(format!(
            "slot length {} out of range [{}, {}]",
            slot_length, MIN_SLOT_LENGTH, MAX_SLOT_LENGTH
        ));
    }
    Ok(())
}

/// Validate a store name (`1-128 chars`, unique within a database).
pub fn validate_store_name(name: &str) -> Result<(), String> {
    let len = name.len();
    if !(MIN_STORE_NAME_LEN..=MAX_STORE_NAME_LEN).contains(&len) {
        return Err(format!(
            "store name length {} out of range [{}, {}]",
            len, MIN_STORE_NAME_LEN, MAX_STORE_NAME_LEN
        ));
    }
    Ok(())
}

/// Validate a requested registry hash-mod partition count.
pub fn validate_registry_hash_mod(value: u32) -> Result<(), String> {
    if !(MIN_REGISTRY_HASH_MOD..=MAX_REGISTRY_HASH_MOD).contains(&value) {
        return Err(format!(
            "registry hash mod {} out of range [{}, {}]",
            value, MIN_REGISTRY_HASH_MOD, MAX_REGISTRY_HASH_MOD
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_length_bounds() {
        assert!(validate_slot_length(1).is_err());
        assert!(validate_slot_length(2).is_ok());
        assert!(validate_slot_length(10_000).is_ok());
        assert!(validate_slot_length(10_001).is_err());
    }

    #[test]
    fn store_name_bounds() {
        assert!(validate_store_name("").is_err());
        assert!(validate_store_name("a").is_ok());
        assert!(validate_store_name(&"a".repeat(128)).is_ok());
        assert!(validate_store_name(&"a".repeat(129)).is_err());
    }

    #[test]
    fn registry_hash_mod_bounds() {
        assert!(validate_registry_hash_mod(0).is_err());
        assert!(validate_registry_hash_mod(1).is_ok());
        assert!(validate_registry_hash_mod(65_536).is_ok());
        assert!(validate_registry_hash_mod(65_537).is_err());
    }
}
