/// Allocation map visualization

use crate::filesystem::{AllocationMap, CheckReport};
use std::collections::HashSet;
use std::fmt::Write;

/// ANSI color codes for allocation map
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BRIGHT_WHITE: &str = "\x1b[97m";
    pub const DARK_WHITE: &str = "\x1b[37m";
    pub const BRIGHT_RED: &str = "\x1b[91m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
}

/// Widest map drawn before columns are merged
const MAX_COLUMNS: usize = 64;

const BLOCK_FREE: &str = "\u{2591}"; // ░ - Light shade (free)
const BLOCK_USED: &str = "\u{2593}"; // ▓ - Dark shade (in-use)

/// Render an allocation map as text
///
/// Columns are tracks (or groups of blocks), rows are units within a column,
/// highest at the top. Units a check flagged as orphaned are yellow and units
/// in use but marked free are red. Volumes wider than 64 columns have
/// neighbouring columns merged into one cell.
pub fn render_allocation_map(map: &AllocationMap, report: Option<&CheckReport>) -> String {
    let mut out = String::new();
    let rows = map.units_per_column.max(1);
    let columns = map.used.len().div_ceil(rows);
    if columns == 0 {
        out.push_str("Empty volume.\n");
        return out;
    }
    let merge = columns.div_ceil(MAX_COLUMNS);
    let cells = columns.div_ceil(merge);

    let orphans: HashSet<usize> = report
        .map(|r| r.orphans.iter().copied().collect())
        .unwrap_or_default();
    let used_but_free: HashSet<usize> = report
        .map(|r| r.used_but_free.iter().copied().collect())
        .unwrap_or_default();

    let _ = writeln!(out, "=== Allocation Map ===");
    let _ = writeln!(
        out,
        "Legend: {}In Use{} {}Free{} {}Orphan{} {}Used but free{}",
        colors::BRIGHT_WHITE,
        colors::RESET,
        colors::DARK_WHITE,
        colors::RESET,
        colors::BRIGHT_YELLOW,
        colors::RESET,
        colors::BRIGHT_RED,
        colors::RESET
    );
    if merge > 1 {
        let _ = writeln!(out, "Each column covers {} columns of {} units", merge, rows);
    }
    out.push('\n');

    for row in (0..rows).rev() {
        let _ = write!(out, "{:>2} ", row);
        for cell in 0..cells {
            let units: Vec<usize> = (cell * merge..((cell + 1) * merge).min(columns))
                .map(|column| column * rows + row)
                .filter(|&unit| unit < map.used.len())
                .collect();
            if units.is_empty() {
                out.push(' ');
                continue;
            }
            let in_use = units.iter().any(|&u| map.used[u]);
            let color = if units.iter().any(|u| used_but_free.contains(u)) {
                colors::BRIGHT_RED
            } else if units.iter().any(|u| orphans.contains(u)) {
                colors::BRIGHT_YELLOW
            } else if in_use {
                colors::BRIGHT_WHITE
            } else {
                colors::DARK_WHITE
            };
            let block = if in_use { BLOCK_USED } else { BLOCK_FREE };
            let _ = write!(out, "{}{}{}", color, block, colors::RESET);
        }
        out.push('\n');
    }

    // Column axis, labelled every fifth cell
    out.push_str("   ");
    let mut printed = vec![false; cells];
    for cell in 0..cells {
        if cell % 5 == 0 && !printed[cell] {
            for (i, digit) in (cell * merge).to_string().chars().enumerate() {
                if cell + i < cells {
                    out.push(digit);
                    printed[cell + i] = true;
                }
            }
        } else if !printed[cell] {
            out.push(' ');
        }
    }
    out.push('\n');
    out
}

/// Print an allocation map to stdout
pub fn draw_allocation_map(map: &AllocationMap, report: Option<&CheckReport>) {
    print!("{}", render_allocation_map(map, report));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_ansi(text: &str) -> String {
        let mut out = String::new();
        let mut in_escape = false;
        for c in text.chars() {
            match (in_escape, c) {
                (false, '\x1b') => in_escape = true,
                (true, 'm') => in_escape = false,
                (true, _) => {}
                (false, c) => out.push(c),
            }
        }
        out
    }

    #[test]
    fn test_render_small_map() {
        let mut used = vec![false; 35 * 16];
        used[0] = true;
        used[17 * 16 + 15] = true;
        let map = AllocationMap {
            units_per_column: 16,
            used,
        };

        let text = strip_ansi(&render_allocation_map(&map, None));
        let lines: Vec<&str> = text.lines().collect();
        let top = lines.iter().find(|l| l.starts_with("15 ")).unwrap();
        let bottom = lines.iter().find(|l| l.starts_with(" 0 ")).unwrap();
        assert_eq!(top.chars().nth(3 + 17), Some('\u{2593}'));
        assert_eq!(top.chars().nth(3), Some('\u{2591}'));
        assert_eq!(bottom.chars().nth(3), Some('\u{2593}'));
        assert!(lines.last().unwrap().starts_with("   0    5"));
    }

    #[test]
    fn test_render_merges_wide_maps() {
        let map = AllocationMap {
            units_per_column: 8,
            used: vec![true; 65535],
        };
        let text = strip_ansi(&render_allocation_map(&map, None));
        assert!(text.contains("Each column covers 128 columns"));
        let row = text.lines().find(|l| l.starts_with(" 7 ")).unwrap();
        assert!(row.chars().count() <= 3 + MAX_COLUMNS);
    }

    #[test]
    fn test_render_marks_orphans() {
        let map = AllocationMap {
            units_per_column: 8,
            used: vec![true; 16],
        };
        let report = CheckReport {
            orphans: vec![9],
            ..Default::default()
        };
        let text = render_allocation_map(&map, Some(&report));
        assert!(text.contains(&format!("{}{}", colors::BRIGHT_YELLOW, BLOCK_USED)));
    }
}
