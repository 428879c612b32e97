/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::AffinityError;
use crate::AffinityMask;
use crate::AffinityResult;
use crate::CpuId;

/// Largest number of logical CPUs a single native mask can describe.
pub const MASK_BITS: usize = AffinityMask::BITS as usize;

/// Converts a set of CPU ids into a native mask.
///
/// Every id must be below `processor_count`, the first one that isn't is reported
/// as [`AffinityError::OutOfRange`]. Duplicates are allowed, an empty set gives `0`.
pub fn encode(
    cpu_ids: impl IntoIterator<Item = CpuId>,
    processor_count: usize,
) -> AffinityResult<AffinityMask> {
    let processor_count = processor_count.min(MASK_BITS);

    cpu_ids.into_iter().try_fold(0, |mask, cpu_id| {
        let bit = cpu_id.bit_index();
        if bit >= processor_count {
            return Err(AffinityError::out_of_range(cpu_id, processor_count));
        }

        Ok(mask | (1 << bit))
    })
}

/// Returns the ascending list of CPU ids whose bits are set in `mask`.
pub fn decode(mask: AffinityMask) -> Vec<CpuId> {
    (0..MASK_BITS)
        .filter(|bit| mask & (1 << bit) != 0)
        .map(|bit| CpuId::new(bit as u32))
        .collect()
}

/// Mask with one bit set for each of the first `processor_count` CPUs.
pub fn system_mask(processor_count: usize) -> AffinityMask {
    if processor_count >= MASK_BITS {
        AffinityMask::MAX
    } else {
        (1 << processor_count) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<CpuId> {
        raw.iter().copied().map(CpuId::new).collect()
    }

    #[test]
    fn empty_set_is_zero_mask() {
        assert_eq!(encode(ids(&[]), 4), Ok(0));
        assert!(decode(0).is_empty());
    }

    #[test]
    fn encode_sets_one_bit_per_cpu() {
        assert_eq!(encode(ids(&[0]), 4), Ok(0b1));
        assert_eq!(encode(ids(&[1, 3]), 4), Ok(0b1010));
        assert_eq!(encode(ids(&[3, 1, 3, 1]), 4), Ok(0b1010));
    }

    #[test]
    fn decode_is_ascending() {
        assert_eq!(decode(0b1011_0001), ids(&[0, 4, 5, 7]));
        assert_eq!(decode(AffinityMask::MAX).len(), MASK_BITS);
        assert_eq!(decode(1 << (MASK_BITS - 1)), ids(&[MASK_BITS as u32 - 1]));
    }

    #[test]
    fn decode_of_encode_sorts_and_dedups() {
        let requested = ids(&[5, 2, 7, 2, 0, 5]);
        let mask = encode(requested, 8).unwrap();
        assert_eq!(decode(mask), ids(&[0, 2, 5, 7]));
    }

    #[test]
    fn decode_of_encode_holds_for_every_subset() {
        const CPUS: u32 = 8;

        for subset in 0..(1usize << CPUS) {
            let expected = (0..CPUS)
                .filter(|cpu| subset & (1 << cpu) != 0)
                .collect::<Vec<_>>();

            // descending order with every id repeated
            let requested = expected
                .iter()
                .rev()
                .flat_map(|&cpu| [cpu, cpu])
                .map(CpuId::new)
                .collect::<Vec<_>>();

            let mask = encode(requested, CPUS as usize).unwrap();
            assert_eq!(mask, subset);
            assert_eq!(decode(mask), ids(&expected), "subset {subset:#010b}");
        }
    }

    #[test]
    fn every_id_from_processor_count_is_out_of_range() {
        for processor_count in [1, 4, 8, MASK_BITS - 1] {
            for bit in processor_count..=MASK_BITS {
                let cpu_id = CpuId::new(bit as u32);
                assert_eq!(
                    encode([cpu_id], processor_count),
                    Err(AffinityError::out_of_range(cpu_id, processor_count)),
                    "cpu {bit} with {processor_count} processors"
                );
            }
        }
    }

    #[test]
    fn first_out_of_range_id_is_reported() {
        let result = encode(ids(&[1, 4, 9]), 4);
        assert_eq!(result, Err(AffinityError::out_of_range(CpuId::new(4), 4)));
    }

    #[test]
    fn processor_count_is_clamped_to_mask_width() {
        let too_wide = CpuId::new(MASK_BITS as u32);
        let result = encode([too_wide], MASK_BITS * 2);
        assert_eq!(result, Err(AffinityError::out_of_range(too_wide, MASK_BITS)));
    }

    #[test]
    fn system_mask_covers_all_processors() {
        assert_eq!(system_mask(0), 0);
        assert_eq!(system_mask(4), 0b1111);
        assert_eq!(system_mask(MASK_BITS), AffinityMask::MAX);
        assert_eq!(system_mask(MASK_BITS + 3), AffinityMask::MAX);
    }
}
