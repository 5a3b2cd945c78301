//! Capture size negotiation.

use crate::geometry::Size;

/// Pick the capture size closest to the requested one.
///
/// An exact match wins outright. Otherwise candidates whose width and height
/// both reach `min(width, height)` are "big enough" and the smallest of them
/// by area is chosen; when none qualify the largest remaining candidate is
/// chosen. Equal areas resolve to the candidate listed first.
///
/// Returns `None` only when `choices` is empty.
pub fn choose_optimal_size(choices: &[Size], width: u32, height: u32) -> Option<Size> {
    let min_side = width.min(height);
    let desired = Size::new(width, height);

    let mut big_enough = Vec::new();
    let mut too_small = Vec::new();
    for &option in choices {
        if option == desired {
            return Some(desired);
        }
        if option.width >= min_side && option.height >= min_side {
            big_enough.push(option);
        } else {
            too_small.push(option);
        }
    }

    if !big_enough.is_empty() {
        // min_by_key keeps the first of several equal minimums.
        big_enough.into_iter().min_by_key(Size::area)
    } else {
        // max_by_key keeps the last maximum, so scan in reverse.
        too_small.into_iter().rev().max_by_key(Size::area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(list: &[(u32, u32)]) -> Vec<Size> {
        list.iter().map(|&(w, h)| Size::new(w, h)).collect()
    }

    #[test]
    fn exact_match_short_circuits() {
        let choices = sizes(&[(640, 480), (1280, 720), (320, 240)]);
        assert_eq!(
            choose_optimal_size(&choices, 640, 480),
            Some(Size::new(640, 480))
        );
    }

    #[test]
    fn exact_match_wins_over_smaller_big_enough() {
        let choices = sizes(&[(500, 500), (1920, 1080), (800, 600)]);
        assert_eq!(
            choose_optimal_size(&choices, 800, 600),
            Some(Size::new(800, 600))
        );
    }

    #[test]
    fn smallest_big_enough_is_chosen() {
        let choices = sizes(&[(1920, 1080), (1280, 720), (320, 240), (640, 360)]);
        // min side is 480: 640x360 fails on height.
        assert_eq!(
            choose_optimal_size(&choices, 640, 480),
            Some(Size::new(1280, 720))
        );
    }

    #[test]
    fn largest_too_small_when_nothing_fits() {
        let choices = sizes(&[(176, 144), (352, 288), (320, 240)]);
        assert_eq!(
            choose_optimal_size(&choices, 1920, 1080),
            Some(Size::new(352, 288))
        );
    }

    #[test]
    fn equal_areas_keep_first_encountered() {
        let big = sizes(&[(1200, 800), (800, 1200), (1600, 1600)]);
        assert_eq!(
            choose_optimal_size(&big, 700, 700),
            Some(Size::new(1200, 800))
        );

        let small = sizes(&[(100, 50), (40, 40), (50, 100)]);
        assert_eq!(
            choose_optimal_size(&small, 700, 700),
            Some(Size::new(100, 50))
        );
    }

    #[test]
    fn very_large_areas_compare_exactly() {
        // These differ by one pixel of area, which an f32 subtraction would lose.
        let choices = sizes(&[(16_777_217, 1), (16_777_216, 1)]);
        assert_eq!(
            choose_optimal_size(&choices, 1, 1),
            Some(Size::new(16_777_216, 1))
        );
    }

    #[test]
    fn empty_candidates_yield_none() {
        assert_eq!(choose_optimal_size(&[], 640, 480), None);
    }
}
