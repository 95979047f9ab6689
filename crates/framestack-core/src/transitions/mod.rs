// crates/framestack-core/src/transitions/mod.rs
//
// Pluggable video transitions.
//
// To add one: create `transitions/my_transition.rs`, impl `VideoTransition`,
// add a `TransitionKind` variant, and append one line to
// `declare_transitions!` below. The compositor picks it up through the
// registry passed in its render settings — there is no global table.
//
// `Cut` is a selector value, never a registry entry: the compositor
// short-circuits it to a hard draw of the incoming clip.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::canvas::{Canvas, PixelView};
use crate::geometry::Rect;

macro_rules! declare_transitions {
    ( $( $module:ident :: $struct:ident ),* $(,)? ) => {
        $( mod $module; )*

        fn make_entries() -> Vec<Box<dyn VideoTransition>> {
            vec![ $( Box::new($module::$struct) ),* ]
        }
    };
}

declare_transitions! {
    fade::Fade,
    slide_x::SlideX,
}

/// Transition selector stored on a `VideoTrackItem`.
///
/// Identifies which blend algorithm applies when this clip overlaps the
/// next one on its track. Serialized with the project — don't rename or
/// remove variants without a migration path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    /// Hard cut — the later clip simply replaces the earlier one.
    #[default]
    Cut,
    /// Alpha dissolve between the two clips' destination rects.
    Fade,
    /// Outgoing clip slides off to the left; incoming slides in from the right.
    SlideX,
}

/// Algorithm contract for video transitions.
///
/// Implementors are zero-size structs — stateless and side-effect-free
/// beyond the canvas draw. The compositor clears the scratch canvas before
/// calling `render` and composites the result afterwards.
///
/// `rate` ∈ [0, 1]: 0 → 100 % `from` (outgoing clip), 1 → 100 % `to`
/// (incoming clip). `transition_duration` is the overlap window length in
/// seconds, for effects that scale with time.
pub trait VideoTransition: Send + Sync {
    /// Discriminant for registry lookup.
    fn kind(&self) -> TransitionKind;

    /// Short name for log output.
    fn label(&self) -> &'static str;

    fn render(
        &self,
        canvas:              &mut Canvas,
        from:                PixelView<'_>,
        from_dest:           Rect,
        to:                  PixelView<'_>,
        to_dest:             Rect,
        transition_duration: f64,
        rate:                f32,
    );
}

/// All registered transitions keyed by `TransitionKind` for O(1) lookup.
///
/// Built once per render and passed to the compositor via its settings.
/// `Cut` has no entry — callers short-circuit it before looking here.
pub fn registry() -> HashMap<TransitionKind, Box<dyn VideoTransition>> {
    make_entries().into_iter().map(|t| (t.kind(), t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_every_non_cut_kind() {
        let reg = registry();
        assert!(reg.contains_key(&TransitionKind::Fade));
        assert!(reg.contains_key(&TransitionKind::SlideX));
        assert!(!reg.contains_key(&TransitionKind::Cut));
    }

    #[test]
    fn entries_report_their_own_kind() {
        for (kind, t) in registry() {
            assert_eq!(kind, t.kind());
        }
    }
}
