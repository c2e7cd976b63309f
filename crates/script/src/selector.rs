//! Solidity call-signature canonicalisation and selector hashing.

use tiny_keccak::{Hasher, Keccak};

/// Reduces a human-written signature to its canonical ABI form:
/// `function foo(address _addr) returns (address)` -> `foo(address)`.
///
/// Parameter names and data-location keywords are dropped (the type is the
/// first token of each parameter), bare `uint`/`int` widen to their 256-bit
/// canonical spelling, and any `returns` clause is ignored.
pub fn canonical_signature(sig: &str) -> Result<String, String> {
    let sig = sig.trim();
    let sig = sig.strip_prefix("function").map(str::trim_start).unwrap_or(sig);

    let open = sig
        .find('(')
        .ok_or_else(|| format!("`{sig}` is not a function signature"))?;
    let close = sig[open..]
        .find(')')
        .map(|i| open + i)
        .ok_or_else(|| format!("`{sig}` is missing a closing parenthesis"))?;

    let name = sig[..open].trim();
    if name.is_empty() {
        return Err(format!("`{sig}` has no function name"));
    }

    let params = sig[open + 1..close].trim();
    let mut types = Vec::new();
    if !params.is_empty() {
        for param in params.split(',') {
            let ty = param
                .split_whitespace()
                .next()
                .ok_or_else(|| format!("empty parameter in `{sig}`"))?;
            types.push(canonical_type(ty));
        }
    }

    Ok(format!("{name}({})", types.join(",")))
}

fn canonical_type(ty: &str) -> String {
    for (bare, wide) in [("uint", "uint256"), ("int", "int256")] {
        if ty == bare {
            return wide.to_string();
        }
        // `uint[4]` and friends widen the element type.
        if let Some(suffix) = ty.strip_prefix(bare) {
            if suffix.starts_with('[') {
                return format!("{wide}{suffix}");
            }
        }
    }
    ty.to_string()
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// First four bytes of the keccak-256 of the canonical signature.
pub fn selector(sig: &str) -> Result<[u8; 4], String> {
    let canonical = canonical_signature(sig)?;
    let digest = keccak256(canonical.as_bytes());
    Ok([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalisation() {
        assert_eq!(
            canonical_signature("function foo(address _addr) returns (address)").unwrap(),
            "foo(address)"
        );
        assert_eq!(canonical_signature("bar()").unwrap(), "bar()");
        assert_eq!(
            canonical_signature("function baz(uint a, int b, uint[2] c)").unwrap(),
            "baz(uint256,int256,uint256[2])"
        );
        assert_eq!(
            canonical_signature("transfer(address to, uint256 amount)").unwrap(),
            "transfer(address,uint256)"
        );
        assert!(canonical_signature("not a signature").is_err());
    }

    #[test]
    fn known_selectors() {
        // Reference values from the Solidity ABI documentation.
        assert_eq!(selector("transfer(address,uint256)").unwrap(), [0xA9, 0x05, 0x9C, 0xBB]);
        assert_eq!(selector("baz(uint32,bool)").unwrap(), [0xCD, 0xCD, 0x77, 0xC0]);
        // Canonicalisation happens before hashing.
        assert_eq!(
            selector("function transfer(address dst, uint wad) returns (bool)").unwrap(),
            [0xA9, 0x05, 0x9C, 0xBB]
        );
    }

    #[test]
    fn keccak_empty_input() {
        // keccak256("") is the well-known c5d2...a470 digest.
        let digest = keccak256(b"");
        assert_eq!(&digest[..4], &[0xC5, 0xD2, 0x46, 0x01]);
    }
}
