/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pure functions for allocating round numbers and sizing quorums.
//!
//! Round numbers are partitioned among proposers by residue: a node only ever proposes in rounds
//! `seq` where `seq ≡ address (mod |peers|)`. Two nodes with distinct addresses below the peer-set
//! size therefore can never run rounds with the same number.

use std::cmp::max;

use crate::types::data_types::{NodeAddress, SequenceNumber};

/// Get the sequence number of this node's next round.
///
/// This is the smallest integer congruent to `me` modulo `peer_count` that strictly exceeds both
/// `accepted_seq` and `proposed_seq`. If neither is set, `me` itself is returned.
pub(crate) fn next_seq(
    me: NodeAddress,
    peer_count: usize,
    accepted_seq: Option<SequenceNumber>,
    proposed_seq: Option<SequenceNumber>,
) -> SequenceNumber {
    let address = me.int() as u64;
    match max(accepted_seq, proposed_seq) {
        None => SequenceNumber::new(address),
        Some(used) => {
            let used = used.int();
            let peer_count = max(peer_count, 1) as u64;
            let candidate = used - used % peer_count + address % peer_count;
            if candidate > used {
                SequenceNumber::new(candidate)
            } else {
                SequenceNumber::new(candidate + peer_count)
            }
        }
    }
}

/// Number of votes that make up a strict majority of `peer_count` peers.
pub(crate) const fn quorum(peer_count: usize) -> usize {
    peer_count / 2 + 1
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn first_round_uses_own_address() {
        assert_eq!(next_seq(NodeAddress::new(2), 3, None, None), SequenceNumber::new(2));
    }

    #[test]
    fn rounds_increase_and_stay_in_residue_class() {
        for peer_count in 1..=5usize {
            let mut used_by_anyone = HashSet::new();
            for address in 0..peer_count as u32 {
                let me = NodeAddress::new(address);
                let mut proposed = None;
                for _ in 0..20 {
                    let seq = next_seq(me, peer_count, None, proposed);
                    assert!(Some(seq) > proposed);
                    assert_eq!(seq.int() % peer_count as u64, address as u64);
                    assert!(used_by_anyone.insert(seq));
                    proposed = Some(seq);
                }
            }
        }
    }

    #[test]
    fn round_exceeds_accepted_seq_from_other_proposers() {
        let seq = next_seq(NodeAddress::new(1), 3, Some(SequenceNumber::new(9)), Some(SequenceNumber::new(4)));
        assert_eq!(seq, SequenceNumber::new(10));

        let seq = next_seq(NodeAddress::new(0), 3, Some(SequenceNumber::new(9)), None);
        assert_eq!(seq, SequenceNumber::new(12));
    }

    #[test]
    fn quorum_is_strict_majority() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 2);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(5), 3);
    }
}
