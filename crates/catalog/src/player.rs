//! Pure player-position arithmetic. Nothing here touches storage; the
//! server loads state, applies one of these transitions, and persists the
//! result.

use rand::seq::SliceRandom;
use rand::Rng;

use common::RepeatMode;

/// Random play order over `len` tracks with the current index pinned at
/// element 0, so the playing track keeps playing when shuffle turns on.
/// The visible index resets to 0 against this map.
pub fn build_shuffle_map<R: Rng>(len: usize, current: usize, rng: &mut R) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let current = current.min(len - 1);
    let mut rest: Vec<usize> = (0..len).filter(|&i| i != current).collect();
    rest.shuffle(rng);
    let mut map = Vec::with_capacity(len);
    map.push(current);
    map.extend(rest);
    map
}

/// The real list index behind a shuffled position, used when shuffle
/// turns off.
pub fn unshuffled_index(map: &[usize], idx: usize) -> usize {
    map.get(idx).copied().unwrap_or(0)
}

pub fn parse_shuffle_map(text: &str) -> Vec<usize> {
    text.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

pub fn format_shuffle_map(map: &[usize]) -> String {
    map.iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// A usable shuffle map is exactly a permutation of `[0, len)`.
pub fn is_permutation_map(map: &[usize], len: usize) -> bool {
    if map.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &i in map {
        if i >= len || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    true
}

/// Next index after a track ends or the user skips. `repeat=one` holds
/// position on a natural end but behaves like `all` on an explicit skip;
/// `repeat=off` clamps at the last track.
pub fn forward(idx: usize, len: usize, repeat: RepeatMode, user_initiated: bool) -> usize {
    if len == 0 {
        return 0;
    }
    let idx = idx.min(len - 1);
    let repeat = if user_initiated && repeat == RepeatMode::One {
        RepeatMode::All
    } else {
        repeat
    };
    if repeat == RepeatMode::One {
        return idx;
    }
    if idx + 1 < len {
        idx + 1
    } else if repeat == RepeatMode::All {
        0
    } else {
        idx
    }
}

/// Previous index on an explicit skip back. `repeat=off` clamps at the
/// first track; any repeat wraps to the end.
pub fn previous(idx: usize, len: usize, repeat: RepeatMode) -> usize {
    if len == 0 {
        return 0;
    }
    let idx = idx.min(len - 1);
    if idx > 0 {
        idx - 1
    } else if repeat == RepeatMode::Off {
        0
    } else {
        len - 1
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use common::RepeatMode;

    use super::{
        build_shuffle_map, format_shuffle_map, forward, is_permutation_map, parse_shuffle_map,
        previous, unshuffled_index,
    };

    #[test]
    fn shuffle_map_pins_current_and_permutes_the_rest() {
        let mut rng = StdRng::seed_from_u64(7);
        let map = build_shuffle_map(8, 3, &mut rng);
        assert_eq!(map[0], 3);
        assert!(is_permutation_map(&map, 8));
    }

    #[test]
    fn shuffle_on_then_off_restores_the_exact_index() {
        let mut rng = StdRng::seed_from_u64(11);
        let current = 5;
        let map = build_shuffle_map(9, current, &mut rng);
        // shuffle-on resets the visible index to 0
        assert_eq!(unshuffled_index(&map, 0), current);
    }

    #[test]
    fn map_round_trips_through_text() {
        let map = vec![4, 0, 2, 1, 3];
        assert_eq!(parse_shuffle_map(&format_shuffle_map(&map)), map);
        assert!(parse_shuffle_map("").is_empty());
    }

    #[test]
    fn broken_maps_are_rejected() {
        assert!(!is_permutation_map(&[0, 1, 1], 3));
        assert!(!is_permutation_map(&[0, 1, 5], 3));
        assert!(!is_permutation_map(&[0, 1], 3));
        assert!(is_permutation_map(&[], 0));
    }

    #[test]
    fn forward_clamps_at_the_end_with_repeat_off() {
        assert_eq!(forward(1, 3, RepeatMode::Off, true), 2);
        assert_eq!(forward(2, 3, RepeatMode::Off, true), 2);
        assert_eq!(forward(2, 3, RepeatMode::Off, false), 2);
    }

    #[test]
    fn forward_wraps_with_repeat_all() {
        assert_eq!(forward(2, 3, RepeatMode::All, false), 0);
        assert_eq!(forward(0, 3, RepeatMode::All, false), 1);
    }

    #[test]
    fn repeat_one_holds_on_natural_end_but_skips_advance() {
        assert_eq!(forward(1, 3, RepeatMode::One, false), 1);
        assert_eq!(forward(1, 3, RepeatMode::One, true), 2);
        assert_eq!(forward(2, 3, RepeatMode::One, true), 0);
    }

    #[test]
    fn previous_clamps_or_wraps_at_the_start() {
        assert_eq!(previous(2, 3, RepeatMode::Off), 1);
        assert_eq!(previous(0, 3, RepeatMode::Off), 0);
        assert_eq!(previous(0, 3, RepeatMode::All), 2);
        assert_eq!(previous(0, 3, RepeatMode::One), 2);
    }

    #[test]
    fn empty_lists_never_move() {
        assert_eq!(forward(0, 0, RepeatMode::All, true), 0);
        assert_eq!(previous(0, 0, RepeatMode::All), 0);
    }
}
