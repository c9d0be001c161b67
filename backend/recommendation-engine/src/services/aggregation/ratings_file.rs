use crate::models::Rating;
use crate::services::source::Result;
use std::path::Path;
use tracing::{info, warn};

const USER_COLUMN: &str = "member_id";
const ITEM_COLUMN: &str = "product_id";
const RATING_COLUMN: &str = "rating";

/// Load pre-built `member_id,product_id,rating` rows.
///
/// Member ids may carry a `u` prefix (`u42`). Rows that fail to parse are
/// skipped.
pub fn load_ratings_file<P: AsRef<Path>>(path: P) -> Result<Vec<Rating>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let ratings = parse_ratings(&content);

    info!(
        path = %path.display(),
        rows = ratings.len(),
        "Ratings file loaded"
    );

    Ok(ratings)
}

fn parse_ratings(content: &str) -> Vec<Rating> {
    let content = content.trim_start_matches('\u{feff}');
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let header = match lines.next() {
        Some(h) => h,
        None => return Vec::new(),
    };
    let columns: Vec<String> = header
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_ascii_lowercase())
        .collect();
    let position = |name: &str| columns.iter().position(|c| c == name);

    let (user_idx, item_idx, rating_idx) =
        match (position(USER_COLUMN), position(ITEM_COLUMN), position(RATING_COLUMN)) {
            (Some(u), Some(i), Some(r)) => (u, i, r),
            _ => {
                warn!(header = header, "Ratings file header missing required columns");
                return Vec::new();
            }
        };

    let mut ratings = Vec::new();
    let mut skipped = 0usize;

    for line in lines {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim().trim_matches('"')).collect();
        match parse_row(&fields, user_idx, item_idx, rating_idx) {
            Some(rating) => ratings.push(rating),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(skipped = skipped, "Skipped malformed rating rows");
    }

    ratings
}

fn parse_row(fields: &[&str], user_idx: usize, item_idx: usize, rating_idx: usize) -> Option<Rating> {
    let user_id = parse_member_id(fields.get(user_idx)?)?;
    let item_id = fields.get(item_idx)?.parse::<i64>().ok()?;
    let value = fields.get(rating_idx)?.parse::<f64>().ok()?;
    value.is_finite().then(|| Rating::new(user_id, item_id, value))
}

fn parse_member_id(raw: &str) -> Option<i64> {
    let digits = match raw.strip_prefix('u').or_else(|| raw.strip_prefix('U')) {
        Some(rest) if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => raw,
    };
    digits.parse().ok()
}
