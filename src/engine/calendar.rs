use crate::model::DateRange;

// ── Free-calendar algebra ────────────────────────────────────────
//
// Closed day ranges: [1..5] and [6..10] are adjacent and merge into [1..10];
// subtracting [3..4] from [1..10] leaves [1..2] and [5..10].
//
// Used only by the read-side calendar query. The admission check deliberately
// does NOT merge windows: a request must fit a single declared window.

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
pub fn merge_windows(sorted: &[DateRange]) -> Vec<DateRange> {
    let mut merged: Vec<DateRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && last.to.succ_opt().is_none_or(|next| range.from <= next) {
                last.to = last.to.max(range.to);
                continue;
            }
        merged.push(range);
    }
    merged
}

/// Subtract sorted disjoint `to_remove` ranges from sorted disjoint `base`
/// ranges.
pub fn subtract_ranges(base: &[DateRange], to_remove: &[DateRange]) -> Vec<DateRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        // Skip removals ending before this base range starts.
        while ri < to_remove.len() && to_remove[ri].to < b.from {
            ri += 1;
        }

        let mut cursor = Some(b.from);
        let mut j = ri;
        while j < to_remove.len() && to_remove[j].from <= b.to {
            let r = &to_remove[j];
            let Some(cur) = cursor else { break };
            if r.from > cur {
                // r.from > cur, so the previous day exists
                let gap_end = r.from.pred_opt().expect("date underflow");
                result.push(DateRange::new(cur, gap_end));
            }
            cursor = match r.to.succ_opt() {
                Some(next) => Some(next.max(cur)),
                None => None, // removal runs to the end of representable time
            };
            j += 1;
        }

        if let Some(cur) = cursor
            && cur <= b.to {
                result.push(DateRange::new(cur, b.to));
            }
    }

    result
}

/// The bookable gaps: union of declared windows minus booked ranges.
/// Inputs need not be sorted or disjoint.
pub fn free_ranges(windows: &[DateRange], booked: &[DateRange]) -> Vec<DateRange> {
    let mut free = windows.to_vec();
    free.sort_by_key(|r| r.from);
    let free = merge_windows(&free);

    if booked.is_empty() {
        return free;
    }
    let mut blocked = booked.to_vec();
    blocked.sort_by_key(|r| r.from);
    let blocked = merge_windows(&blocked);
    subtract_ranges(&free, &blocked)
}
