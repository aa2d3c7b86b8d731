//! Terminal formatting for the `scrobbles` command.

use crate::scrobble::Scrobble;

const HEADERS: [&str; 5] = ["ARTISTS", "TRACK", "ALBUM", "DURATION", "TIMESTAMP"];

/// Print scrobbles as an aligned table, one row per play.
pub fn print_scrobbles(scrobbles: &[Scrobble]) {
    let rows: Vec<[String; 5]> = scrobbles
        .iter()
        .map(|s| {
            [
                s.join_artists(),
                s.track.clone(),
                s.album.clone(),
                s.pretty_duration(),
                s.timestamp.to_rfc2822(),
            ]
        })
        .collect();

    let widths = column_widths(&rows);

    print_row(&HEADERS.map(String::from), &widths);
    for row in &rows {
        print_row(row, &widths);
    }
}

fn column_widths(rows: &[[String; 5]]) -> [usize; 5] {
    let mut widths = HEADERS.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }
    widths
}

fn print_row(row: &[String; 5], widths: &[usize; 5]) {
    let mut line = String::new();
    for (cell, width) in row.iter().zip(widths.iter()) {
        line.push_str(cell);
        // Pad by character count so Unicode titles stay aligned.
        let padding = width.saturating_sub(cell.chars().count()) + 2;
        line.push_str(&" ".repeat(padding));
    }
    println!("{}", line.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths_cover_headers_and_cells() {
        let rows = vec![[
            "A Very Long Artist Name".to_string(),
            "T".to_string(),
            "L".to_string(),
            "3m".to_string(),
            "ts".to_string(),
        ]];
        let widths = column_widths(&rows);
        assert_eq!(widths[0], "A Very Long Artist Name".len());
        // Header longer than every cell wins.
        assert_eq!(widths[1], "TRACK".len());
    }
}
