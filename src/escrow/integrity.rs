//! Merkle-path integrity proof verification for delivery receipts
//! (spec §4.7, Open Question decision #4).

use crate::policy::signer::PolicyStampSigner;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityProof {
    pub leaf_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub path: Vec<(Direction, [u8; 32])>,
    pub signature: Vec<u8>,
}

fn fold(leaf: [u8; 32], sibling: [u8; 32], direction: Direction) -> [u8; 32] {
    let mut hasher = Sha256::new();
    match direction {
        Direction::Left => {
            hasher.update(sibling);
            hasher.update(leaf);
        }
        Direction::Right => {
            hasher.update(leaf);
            hasher.update(sibling);
        }
    }
    hasher.finalize().into()
}

fn recompute_root(proof: &IntegrityProof) -> [u8; 32] {
    proof
        .path
        .iter()
        .fold(proof.leaf_hash, |acc, (direction, sibling)| {
            fold(acc, *sibling, *direction)
        })
}

/// Both the recomputed Merkle root and the signature over it must hold
/// for the proof to verify (spec decision #4).
pub fn verify_integrity_proof(proof: &IntegrityProof, signer: &PolicyStampSigner) -> bool {
    let recomputed = recompute_root(proof);
    if recomputed != proof.merkle_root {
        return false;
    }
    signer.verify_raw(&proof.merkle_root, &proof.signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn valid_proof_verifies() {
        let signer = PolicyStampSigner::new([9u8; 32]);
        let leaf_hash = leaf(1);
        let sibling = leaf(2);
        let root = fold(leaf_hash, sibling, Direction::Right);
        let signature = signer.sign_raw(&root);
        let proof = IntegrityProof {
            leaf_hash,
            merkle_root: root,
            path: vec![(Direction::Right, sibling)],
            signature,
        };
        assert!(verify_integrity_proof(&proof, &signer));
    }

    #[test]
    fn tampered_root_fails() {
        let signer = PolicyStampSigner::new([9u8; 32]);
        let leaf_hash = leaf(1);
        let sibling = leaf(2);
        let root = fold(leaf_hash, sibling, Direction::Right);
        let signature = signer.sign_raw(&root);
        let proof = IntegrityProof {
            leaf_hash,
            merkle_root: leaf(9),
            path: vec![(Direction::Right, sibling)],
            signature,
        };
        assert!(!verify_integrity_proof(&proof, &signer));
    }

    #[test]
    fn tampered_signature_fails() {
        let signer = PolicyStampSigner::new([9u8; 32]);
        let leaf_hash = leaf(1);
        let sibling = leaf(2);
        let root = fold(leaf_hash, sibling, Direction::Right);
        let mut signature = signer.sign_raw(&root);
        signature[0] ^= 0xFF;
        let proof = IntegrityProof {
            leaf_hash,
            merkle_root: root,
            path: vec![(Direction::Right, sibling)],
            signature,
        };
        assert!(!verify_integrity_proof(&proof, &signer));
    }
}
