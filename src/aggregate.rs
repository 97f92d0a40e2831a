use std::collections::HashMap;

use crate::models::AttendanceRecord;

/// An sRGB colour from the fixed chart palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

pub const PALETTE: [Rgb; 7] = [
    Rgb(0xFF, 0x63, 0x84),
    Rgb(0x36, 0xA2, 0xEB),
    Rgb(0xFF, 0xCE, 0x56),
    Rgb(0x4B, 0xC0, 0xC0),
    Rgb(0x99, 0x66, 0xFF),
    Rgb(0xFF, 0x9F, 0x40),
    Rgb(0x47, 0xB3, 0x9C),
];

/// Colour for the slice at `index`; wraps around past the end of the palette.
pub fn palette_color(index: usize) -> Rgb {
    PALETTE[index % PALETTE.len()]
}

/// Visit counts per course, in the order each course was first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseCounts {
    entries: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSlice {
    pub course: String,
    pub count: usize,
    pub share: f64,
    pub color: Rgb,
}

pub fn aggregate(records: &[AttendanceRecord]) -> CourseCounts {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut entries: Vec<(String, usize)> = Vec::new();

    for record in records {
        let position = *positions.entry(record.course.as_str()).or_insert_with(|| {
            entries.push((record.course.clone(), 0));
            entries.len() - 1
        });
        entries[position].1 += 1;
    }

    CourseCounts { entries }
}

impl CourseCounts {
    #[cfg(test)]
    pub fn get(&self, course: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(name, _)| name == course)
            .map(|(_, count)| *count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    pub fn title(&self) -> String {
        format!("Total Courses: {}", self.len())
    }

    pub fn slices(&self) -> Vec<ChartSlice> {
        let total = self.total();
        self.entries
            .iter()
            .enumerate()
            .map(|(index, (course, count))| ChartSlice {
                course: course.clone(),
                count: *count,
                share: if total == 0 {
                    0.0
                } else {
                    *count as f64 / total as f64
                },
                color: palette_color(index),
            })
            .collect()
    }
}

/// Splits `width` cells between `counts` by largest remainder.
pub fn segment_widths(counts: &[usize], width: u16) -> Vec<u16> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return vec![0; counts.len()];
    }

    let width = width as usize;
    let mut widths: Vec<usize> = counts.iter().map(|c| c * width / total).collect();
    let mut remainders: Vec<(usize, usize)> = counts
        .iter()
        .enumerate()
        .map(|(index, c)| (index, c * width % total))
        .collect();
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let assigned: usize = widths.iter().sum();
    for (index, _) in remainders.iter().take(width - assigned) {
        widths[*index] += 1;
    }

    widths.into_iter().map(|w| w as u16).collect()
}

/// The `limit` most recent records; unparsable timestamps sort last.
pub fn recent_visits(records: &[AttendanceRecord], limit: usize) -> Vec<AttendanceRecord> {
    let mut recent = records.to_vec();
    recent.sort_by(|a, b| b.occurred_at().cmp(&a.occurred_at()));
    recent.truncate(limit);
    recent
}
