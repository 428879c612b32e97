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

use std::collections::BTreeSet;

use crate::bitmask::MASK_BITS;
use crate::AffinityError;
use crate::AffinityResult;
use crate::CpuId;

/// Parses a cpu list in the kernel's `cpulist` format, e.g. `"0-3,5,7-9"`.
///
/// The result is sorted and deduplicated, empty entries are skipped. Ids that
/// don't fit in a native mask are rejected before any range is expanded.
pub fn parse_cpu_list(list: &str) -> AffinityResult<Vec<CpuId>> {
    let mut cpu_ids = BTreeSet::new();

    for part in list.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_cpu_id(start, part)?;
                let end = parse_cpu_id(end, part)?;
                if start > end {
                    return Err(AffinityError::ParseError(format!(
                        "range {part} is reversed"
                    )));
                }
                cpu_ids.extend(start..=end);
            }
            None => {
                cpu_ids.insert(parse_cpu_id(part, part)?);
            }
        }
    }

    Ok(cpu_ids.into_iter().map(CpuId::new).collect())
}

/// Renders cpu ids back into the compact `cpulist` format.
pub fn format_cpu_list(cpu_ids: &[CpuId]) -> String {
    let sorted = cpu_ids.iter().copied().collect::<BTreeSet<_>>();

    let mut ranges: Vec<(CpuId, CpuId)> = Vec::new();
    for cpu_id in sorted {
        if let Some((_, end)) = ranges.last_mut() {
            if end.bit_index() + 1 == cpu_id.bit_index() {
                *end = cpu_id;
                continue;
            }
        }
        ranges.push((cpu_id, cpu_id));
    }

    ranges
        .into_iter()
        .map(|(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_cpu_id(value: &str, part: &str) -> AffinityResult<u32> {
    let cpu_id = value
        .trim()
        .parse::<u32>()
        .map_err(|_| AffinityError::ParseError(format!("invalid cpu entry: {part}")))?;

    if cpu_id as usize >= MASK_BITS {
        return Err(AffinityError::ParseError(format!(
            "cpu entry {part} exceeds the {MASK_BITS} cpus a mask can hold"
        )));
    }

    Ok(cpu_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<CpuId> {
        raw.iter().copied().map(CpuId::new).collect()
    }

    #[test]
    fn parses_single_ids_and_ranges() {
        assert_eq!(parse_cpu_list("0").unwrap(), ids(&[0]));
        assert_eq!(parse_cpu_list("0-3").unwrap(), ids(&[0, 1, 2, 3]));
        assert_eq!(
            parse_cpu_list("0-2,5,7-9").unwrap(),
            ids(&[0, 1, 2, 5, 7, 8, 9])
        );
        assert_eq!(
            parse_cpu_list(" 0 - 2 , 5 ").unwrap(),
            ids(&[0, 1, 2, 5])
        );
    }

    #[test]
    fn dedups_and_skips_empty_entries() {
        assert_eq!(parse_cpu_list("3,1,3,,1").unwrap(), ids(&[1, 3]));
        assert_eq!(parse_cpu_list("").unwrap(), ids(&[]));
    }

    #[test]
    fn rejects_malformed_entries() {
        for list in ["abc", "0-abc", "-5", "5-", "--", "4-2"] {
            assert!(
                matches!(parse_cpu_list(list), Err(AffinityError::ParseError(_))),
                "{list} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_ids_beyond_mask_width() {
        let last = MASK_BITS as u32 - 1;
        assert_eq!(
            parse_cpu_list(&format!("0-{last}")).unwrap().len(),
            MASK_BITS
        );

        for list in [
            format!("{MASK_BITS}"),
            format!("0-{MASK_BITS}"),
            "0-4294967295".to_string(),
            "0-20000000".to_string(),
        ] {
            assert!(
                matches!(parse_cpu_list(&list), Err(AffinityError::ParseError(_))),
                "{list} should be rejected"
            );
        }
    }

    #[test]
    fn formats_compact_ranges() {
        assert_eq!(format_cpu_list(&ids(&[])), "");
        assert_eq!(format_cpu_list(&ids(&[4])), "4");
        assert_eq!(format_cpu_list(&ids(&[0, 1, 2, 3, 5, 8, 9])), "0-3,5,8-9");
        assert_eq!(format_cpu_list(&ids(&[9, 8, 1, 1])), "1,8-9");
    }
}
