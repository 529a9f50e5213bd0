//! Pan and zoom over a laid-out flow.
//!
//! `reduce_zoom` is the whole state machine; `Viewport` adds the coalescing
//! of container resize reports on top of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ViewportConfig;
use crate::scheduler::DebounceWithLimit;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewSize {
    pub width: f32,
    pub height: f32,
}

impl ViewSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomState {
    pub zoom: f32,
    pub dx: f32,
    pub dy: f32,
    /// Set until a fit could be computed from both the root and container sizes.
    pub awaiting_sizes: bool,
    pub dragging: bool,
    pub container_size: Option<ViewSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomAction {
    UpdateContainerSize(ViewSize),
    Wheel { dx: f32, dy: f32, control: bool },
    Drag { mx: f32, my: f32 },
    MouseDown,
    MouseUp,
    DiscreteZoom(ZoomDirection),
    Reset,
    SizesChanged,
}

fn clamp_zoom(config: &ViewportConfig, zoom: f32) -> f32 {
    zoom.min(config.max_zoom).max(config.min_zoom)
}

/// Keeps the zoom in range and the content at least partly on screen. Pan
/// bounds are computed from the proposed zoom, before it is clamped.
fn clamp(config: &ViewportConfig, root: Option<ViewSize>, proposed: ZoomState) -> ZoomState {
    let container = proposed.container_size.unwrap_or(ViewSize::new(
        config.default_container_width,
        config.default_container_height,
    ));
    let root = root.unwrap_or_default();
    let max_dx = container.width / proposed.zoom;
    let max_dy = container.height / proposed.zoom;
    ZoomState {
        zoom: clamp_zoom(config, proposed.zoom),
        dx: proposed.dx.min(max_dx).max(-root.width / proposed.zoom),
        dy: proposed.dy.min(max_dy).max(-root.height / proposed.zoom),
        ..proposed
    }
}

/// Largest zoom showing all of `root` with some margin, centered.
pub fn size_to_fit(config: &ViewportConfig, root: Option<ViewSize>, container: Option<ViewSize>) -> ZoomState {
    // An empty root has no scale to fit to.
    let root = root.filter(|root| root.width > 0.0 && root.height > 0.0);
    let (Some(root), Some(container)) = (root, container) else {
        return ZoomState {
            zoom: 1.0,
            dx: 0.0,
            dy: 0.0,
            awaiting_sizes: true,
            dragging: false,
            container_size: container,
        };
    };

    let padding = config.padding_factor;
    let width_zoom = (container.width - padding) / (root.width * padding);
    let height_zoom = (container.height - padding) / (root.height * padding);
    let zoom = clamp_zoom(config, width_zoom.min(height_zoom));

    clamp(
        config,
        Some(root),
        ZoomState {
            zoom,
            dx: (container.width - root.width * zoom) / 2.0 / zoom,
            dy: (container.height - root.height * zoom) / 2.0 / zoom,
            awaiting_sizes: false,
            dragging: false,
            container_size: Some(container),
        },
    )
}

pub fn reduce_zoom(
    config: &ViewportConfig,
    root: Option<ViewSize>,
    state: ZoomState,
    action: ZoomAction,
) -> ZoomState {
    match action {
        ZoomAction::UpdateContainerSize(size) => ZoomState {
            container_size: Some(size),
            ..state
        },
        ZoomAction::Reset => size_to_fit(config, root, state.container_size),
        ZoomAction::DiscreteZoom(direction) => {
            let step = match direction {
                ZoomDirection::In => config.zoom_step,
                ZoomDirection::Out => -config.zoom_step,
            };
            clamp(
                config,
                root,
                ZoomState {
                    zoom: state.zoom + step,
                    ..state
                },
            )
        }
        ZoomAction::Drag { mx, my } => {
            if !state.dragging {
                return state;
            }
            clamp(
                config,
                root,
                ZoomState {
                    dx: state.dx + mx / state.zoom,
                    dy: state.dy + my / state.zoom,
                    ..state
                },
            )
        }
        ZoomAction::MouseDown => ZoomState {
            dragging: true,
            ..state
        },
        ZoomAction::MouseUp => ZoomState {
            dragging: false,
            ..state
        },
        ZoomAction::SizesChanged => {
            if state.awaiting_sizes {
                size_to_fit(config, root, state.container_size)
            } else {
                state
            }
        }
        ZoomAction::Wheel { dx, dy, control } => {
            let proposed = if control {
                let delta = dy.clamp(-1.0, 1.0);
                ZoomState {
                    zoom: state.zoom - delta / config.wheel_divisor,
                    ..state
                }
            } else {
                ZoomState {
                    dx: state.dx - dx,
                    dy: state.dy - dy,
                    ..state
                }
            };
            clamp(config, root, proposed)
        }
    }
}

/// CSS-equivalent rendering of a zoom state: `scale(zoom)` then a translate
/// by `(dx, dy)`, with the origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewTransform {
    pub scale: f32,
    pub translate_x: f32,
    pub translate_y: f32,
    pub inverse_zoom: f32,
}

impl ViewTransform {
    pub fn css(&self) -> String {
        format!(
            "scale({}) translate3d({}px, {}px, 0)",
            self.scale, self.translate_x, self.translate_y
        )
    }
}

struct ViewportInner {
    root: Option<ViewSize>,
    state: ZoomState,
}

/// Live pan/zoom state for one view of a flow.
#[derive(Clone)]
pub struct Viewport {
    config: Arc<ViewportConfig>,
    inner: Arc<Mutex<ViewportInner>>,
    resize: DebounceWithLimit,
}

impl Viewport {
    pub fn new(config: ViewportConfig) -> Self {
        let resize = DebounceWithLimit::new(
            Duration::from_millis(config.resize_debounce_ms),
            Duration::from_millis(config.resize_max_wait_ms),
        );
        let state = size_to_fit(&config, None, None);
        Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(ViewportInner { root: None, state })),
            resize,
        }
    }

    fn inner(&self) -> MutexGuard<'_, ViewportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatch(&self, action: ZoomAction) -> ZoomState {
        let mut inner = self.inner();
        inner.state = reduce_zoom(&self.config, inner.root, inner.state, action);
        inner.state
    }

    pub fn state(&self) -> ZoomState {
        self.inner().state
    }

    /// Sets the size of the laid-out root. Going from unknown to known lets a
    /// pending fit-to-view happen.
    pub fn set_root_size(&self, root: Option<ViewSize>) {
        let appeared = {
            let mut inner = self.inner();
            let appeared = inner.root.is_none() != root.is_none();
            inner.root = root;
            appeared
        };
        if appeared {
            self.dispatch(ZoomAction::SizesChanged);
        }
    }

    /// Coalesces bursts of container resize notifications.
    pub fn report_container_size(&self, size: ViewSize) {
        let inner = Arc::downgrade(&self.inner);
        let config = self.config.clone();
        self.resize.schedule(move || {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.state = reduce_zoom(&config, inner.root, inner.state, ZoomAction::UpdateContainerSize(size));
        });
    }

    pub fn transform(&self) -> ViewTransform {
        let state = self.state();
        ViewTransform {
            scale: state.zoom,
            translate_x: state.dx,
            translate_y: state.dy,
            inverse_zoom: 1.0 / state.zoom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ViewportConfig {
        ViewportConfig::default()
    }

    fn fitted() -> ZoomState {
        size_to_fit(&config(), Some(ViewSize::new(500.0, 400.0)), Some(ViewSize::new(600.0, 600.0)))
    }

    #[test]
    fn fit_waits_for_both_sizes() {
        let state = size_to_fit(&config(), Some(ViewSize::new(10.0, 10.0)), None);
        assert!(state.awaiting_sizes);
        assert_eq!(state.zoom, 1.0);
    }

    #[test]
    fn empty_root_keeps_waiting() {
        let container = Some(ViewSize::new(1.2, 600.0));
        for root in [ViewSize::new(0.0, 400.0), ViewSize::new(500.0, 0.0)] {
            let state = size_to_fit(&config(), Some(root), container);
            assert!(state.awaiting_sizes);
            assert_eq!((state.zoom, state.dx, state.dy), (1.0, 0.0, 0.0));
            assert_eq!(state.container_size, container);
        }
    }

    #[test]
    fn fit_centers_content() {
        let state = fitted();
        let expected = (600.0 - 1.2) / (500.0 * 1.2);
        assert!((state.zoom - expected).abs() < 1e-5);
        let visible_width = 500.0 * state.zoom;
        assert!((state.dx * state.zoom - (600.0 - visible_width) / 2.0).abs() < 1e-3);
        assert!(!state.awaiting_sizes);
    }

    #[test]
    fn zoom_is_clamped() {
        let root = Some(ViewSize::new(500.0, 400.0));
        let mut state = fitted();
        for _ in 0..40 {
            state = reduce_zoom(&config(), root, state, ZoomAction::DiscreteZoom(ZoomDirection::In));
        }
        assert_eq!(state.zoom, 5.0);
        for _ in 0..40 {
            state = reduce_zoom(&config(), root, state, ZoomAction::DiscreteZoom(ZoomDirection::Out));
        }
        assert_eq!(state.zoom, 0.2);
    }

    #[test]
    fn wheel_with_control_zooms_by_clamped_delta() {
        let root = Some(ViewSize::new(500.0, 400.0));
        let state = ZoomState { zoom: 1.0, ..fitted() };
        let zoomed = reduce_zoom(
            &config(),
            root,
            state,
            ZoomAction::Wheel { dx: 0.0, dy: -50.0, control: true },
        );
        assert!((zoomed.zoom - 1.05).abs() < 1e-6);
    }

    #[test]
    fn pan_is_bounded_by_root_and_container() {
        let root = Some(ViewSize::new(500.0, 400.0));
        let state = ZoomState { zoom: 1.0, dx: 0.0, dy: 0.0, ..fitted() };
        let panned = reduce_zoom(
            &config(),
            root,
            state,
            ZoomAction::Wheel { dx: 10_000.0, dy: -10_000.0, control: false },
        );
        assert_eq!(panned.dx, -500.0);
        assert_eq!(panned.dy, 600.0);
    }

    #[test]
    fn drag_needs_mouse_down() {
        let root = Some(ViewSize::new(500.0, 400.0));
        let state = ZoomState { zoom: 2.0, dx: 0.0, dy: 0.0, ..fitted() };
        let ignored = reduce_zoom(&config(), root, state, ZoomAction::Drag { mx: 10.0, my: 4.0 });
        assert_eq!(ignored, state);
        let down = reduce_zoom(&config(), root, state, ZoomAction::MouseDown);
        let dragged = reduce_zoom(&config(), root, down, ZoomAction::Drag { mx: 10.0, my: 4.0 });
        assert_eq!((dragged.dx, dragged.dy), (5.0, 2.0));
        let up = reduce_zoom(&config(), root, dragged, ZoomAction::MouseUp);
        assert!(!up.dragging);
    }

    #[tokio::test(start_paused = true)]
    async fn container_reports_are_coalesced_then_fit() {
        let viewport = Viewport::new(config());
        viewport.report_container_size(ViewSize::new(100.0, 100.0));
        viewport.report_container_size(ViewSize::new(600.0, 600.0));
        assert_eq!(viewport.state().container_size, None);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(viewport.state().container_size, Some(ViewSize::new(600.0, 600.0)));

        viewport.set_root_size(Some(ViewSize::new(500.0, 400.0)));
        let state = viewport.state();
        assert!(!state.awaiting_sizes);
        assert!(viewport.transform().css().starts_with("scale("));
    }
}
