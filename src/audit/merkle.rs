//! Merkle root over a verified hash chain

use crate::domain::Digest;

/// Merkle root of a sequence of event digests.
///
/// Built bottom-up with SHA-256 over concatenated child pairs. An odd node
/// is promoted unchanged; the root of an empty sequence is the genesis digest.
pub fn merkle_root(leaves: &[Digest]) -> Digest {
    if leaves.is_empty() {
        return Digest::GENESIS;
    }

    let mut level: Vec<Digest> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair.get(1) {
                Some(right) => Digest::of_parts(&[pair[0].as_bytes(), right.as_bytes()]),
                None => pair[0],
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> Digest {
        Digest::of_parts(&[&[n]])
    }

    #[test]
    fn test_empty_root_is_genesis() {
        assert_eq!(merkle_root(&[]), Digest::GENESIS);
    }

    #[test]
    fn test_single_leaf_is_root() {
        assert_eq!(merkle_root(&[leaf(1)]), leaf(1));
    }

    #[test]
    fn test_odd_leaf_promoted() {
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        let ab = Digest::of_parts(&[a.as_bytes(), b.as_bytes()]);
        let expected = Digest::of_parts(&[ab.as_bytes(), c.as_bytes()]);
        assert_eq!(merkle_root(&[a, b, c]), expected);
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(merkle_root(&[leaf(1), leaf(2)]), merkle_root(&[leaf(2), leaf(1)]));
    }
}
