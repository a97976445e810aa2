//! Render state management

use crate::document::DocumentHandle;

use super::request::RenderParams;

/// Smallest scale accepted regardless of configuration
pub const MIN_SCALE: f32 = 0.1;

/// Current render state for a document
#[derive(Clone, Debug)]
pub struct RenderState {
    /// Loaded document, if any
    pub handle: Option<DocumentHandle>,

    /// User-specified scale factor
    pub scale: f32,

    /// Allowed scale range
    pub min_scale: f32,
    pub max_scale: f32,

    /// Current page (1-based; 0 while no document is loaded)
    pub current_page: usize,

    /// Total page count
    pub page_count: usize,
}

impl RenderState {
    #[must_use]
    pub fn new(scale: f32, min_scale: f32, max_scale: f32) -> Self {
        let min_scale = min_scale.max(MIN_SCALE);
        let max_scale = max_scale.max(min_scale);
        Self {
            handle: None,
            scale: clamp_scale(scale, min_scale, max_scale),
            min_scale,
            max_scale,
            current_page: 0,
            page_count: 0,
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::SetDocument { handle, page_count } => {
                self.handle = Some(handle);
                self.page_count = page_count;
                self.current_page = if page_count > 0 { 1 } else { 0 };
                vec![Effect::InvalidateCache, Effect::RenderCurrentPage]
            }

            Command::CloseDocument => {
                self.handle = None;
                self.page_count = 0;
                self.current_page = 0;
                vec![Effect::InvalidateCache]
            }

            Command::SetScale(scale) => {
                let clamped = clamp_scale(scale, self.min_scale, self.max_scale);
                if (self.scale - clamped).abs() > f32::EPSILON {
                    self.scale = clamped;
                    self.render_if_loaded()
                } else {
                    vec![]
                }
            }

            Command::GoToPage(page) => {
                if self.page_count == 0 {
                    return vec![];
                }
                let clamped = page.clamp(1, self.page_count);
                if self.current_page != clamped {
                    self.current_page = clamped;
                    vec![Effect::RenderCurrentPage]
                } else {
                    vec![]
                }
            }

            Command::Rerender => self.render_if_loaded(),
        }
    }

    fn render_if_loaded(&self) -> Vec<Effect> {
        if self.handle.is_some() && self.current_page > 0 {
            vec![Effect::RenderCurrentPage]
        } else {
            vec![]
        }
    }

    /// Get render parameters from current state
    #[must_use]
    pub fn render_params(&self) -> RenderParams {
        RenderParams {
            page: self.current_page,
            scale: self.scale,
        }
    }
}

/// Clamp a scale into range, handling NaN/Inf
#[must_use]
pub fn clamp_scale(scale: f32, min: f32, max: f32) -> f32 {
    if !scale.is_finite() {
        1.0_f32.clamp(min, max)
    } else {
        scale.clamp(min, max)
    }
}

/// Commands that modify render state
#[derive(Clone, Debug)]
pub enum Command {
    /// A document finished loading
    SetDocument {
        handle: DocumentHandle,
        page_count: usize,
    },
    /// Forget the current document
    CloseDocument,
    /// Set the scale factor
    SetScale(f32),
    /// Go to a specific page (1-based)
    GoToPage(usize),
    /// Render the current page again with unchanged parameters
    Rerender,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Invalidate entire cache
    InvalidateCache,
    /// Render the current page
    RenderCurrentPage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_state(pages: usize) -> RenderState {
        let mut state = RenderState::new(1.0, 0.25, 5.0);
        let _ = state.apply(Command::SetDocument {
            handle: DocumentHandle {
                id: 1,
                reference: "test".to_string(),
            },
            page_count: pages,
        });
        state
    }

    #[test]
    fn set_document_starts_at_page_one() {
        let mut state = RenderState::new(1.0, 0.25, 5.0);
        let effects = state.apply(Command::SetDocument {
            handle: DocumentHandle {
                id: 7,
                reference: "doc".to_string(),
            },
            page_count: 3,
        });

        assert_eq!(state.current_page, 1);
        assert_eq!(
            effects,
            vec![Effect::InvalidateCache, Effect::RenderCurrentPage]
        );
    }

    #[test]
    fn go_to_page_clamps_to_range() {
        let mut state = loaded_state(10);

        let effects = state.apply(Command::GoToPage(999));
        assert_eq!(state.current_page, 10);
        assert_eq!(effects, vec![Effect::RenderCurrentPage]);

        let effects = state.apply(Command::GoToPage(0));
        assert_eq!(state.current_page, 1);
        assert_eq!(effects, vec![Effect::RenderCurrentPage]);
    }

    #[test]
    fn go_to_same_page_is_a_no_op() {
        let mut state = loaded_state(3);
        assert!(state.apply(Command::GoToPage(1)).is_empty());
    }

    #[test]
    fn scale_and_page_share_the_render_effect() {
        let mut state = loaded_state(3);

        assert_eq!(
            state.apply(Command::SetScale(2.0)),
            vec![Effect::RenderCurrentPage]
        );
        assert_eq!(
            state.apply(Command::GoToPage(2)),
            vec![Effect::RenderCurrentPage]
        );
    }

    #[test]
    fn scale_is_clamped_and_sanitized() {
        let mut state = loaded_state(1);

        let _ = state.apply(Command::SetScale(50.0));
        assert_eq!(state.scale, 5.0);

        let _ = state.apply(Command::SetScale(f32::NAN));
        assert_eq!(state.scale, 1.0);

        let _ = state.apply(Command::SetScale(0.0));
        assert_eq!(state.scale, 0.25);
    }

    #[test]
    fn nothing_renders_without_a_document() {
        let mut state = RenderState::new(1.0, 0.25, 5.0);
        assert!(state.apply(Command::SetScale(2.0)).is_empty());
        assert!(state.apply(Command::GoToPage(2)).is_empty());
        assert!(state.apply(Command::Rerender).is_empty());
    }
}
