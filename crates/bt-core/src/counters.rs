//! Denormalized aggregate counters (`posts_count`, `likes_count`).

/// Applies a signed delta to a stored count, flooring at zero.
pub fn adjust(count: u32, delta: i64) -> u32 {
    let next = i64::from(count).saturating_add(delta);
    u32::try_from(next.max(0)).unwrap_or(u32::MAX)
}
