//! Headless natural-size estimation for states and transitions.
//!
//! A renderer normally reports sizes through the scheduler as elements lay
//! themselves out. Without one, `Measurer` produces the same reports from the
//! text a state or transition box would show.

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use ttf_parser::Face;

use crate::config::MeasureConfig;
use crate::flow_utils::{FullFlow, display_name, materialize_default, transition_label};
use crate::ir::{Flow, FlowItemRef, State, StateId, Transition};
use crate::layout::{Padding, PositionedItemId, Size, SizeMap};

static FONT_CACHE: Lazy<Mutex<FontCache>> = Lazy::new(|| Mutex::new(FontCache::new()));

/// Width of `text` in the first family of `font_family` that resolves, or
/// `None` when no font could be loaded.
pub fn measure_text_width(text: &str, font_size: f32, font_family: &str) -> Option<f32> {
    if text.is_empty() || font_size <= 0.0 {
        return Some(0.0);
    }
    let mut guard = FONT_CACHE.lock().ok()?;
    guard.measure(text, font_size, font_family)
}

struct FontCache {
    db: Database,
    loaded_system_fonts: bool,
    faces: HashMap<String, Option<FontMetrics>>,
}

impl FontCache {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            faces: HashMap::new(),
        }
    }

    fn measure(&mut self, text: &str, font_size: f32, font_family: &str) -> Option<f32> {
        let key = normalize_family_key(font_family);
        if !self.faces.contains_key(&key) {
            let metrics = self.load(font_family);
            if metrics.is_none() {
                tracing::debug!(family = font_family, "no font resolved, using estimated advances");
            }
            self.faces.insert(key.clone(), metrics);
        }
        let metrics = self.faces.get_mut(&key)?.as_mut()?;
        Some(metrics.width(&text.replace('\t', "    "), font_size))
    }

    fn load(&mut self, font_family: &str) -> Option<FontMetrics> {
        let tokens = family_tokens(font_family);
        let families: Vec<Family<'_>> = tokens
            .iter()
            .map(|token| match token {
                FamilyToken::Generic(family) => *family,
                FamilyToken::Name(name) => Family::Name(name.as_str()),
            })
            .collect();

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        self.db
            .with_face_data(id, |data, index| FontMetrics::parse(data.to_vec(), index))
            .flatten()
    }
}

enum FamilyToken {
    Generic(Family<'static>),
    Name(String),
}

fn family_tokens(font_family: &str) -> Vec<FamilyToken> {
    let mut tokens: Vec<FamilyToken> = font_family
        .split(',')
        .map(|part| part.trim().trim_matches('"').trim_matches('\''))
        .filter(|raw| !raw.is_empty())
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "serif" => FamilyToken::Generic(Family::Serif),
            "sans-serif" | "system-ui" | "-apple-system" | "ui-sans-serif" => {
                FamilyToken::Generic(Family::SansSerif)
            }
            "monospace" | "ui-monospace" => FamilyToken::Generic(Family::Monospace),
            "cursive" => FamilyToken::Generic(Family::Cursive),
            "fantasy" => FamilyToken::Generic(Family::Fantasy),
            _ => FamilyToken::Name(raw.to_string()),
        })
        .collect();
    if tokens.is_empty() {
        tokens.push(FamilyToken::Generic(Family::SansSerif));
    }
    tokens
}

fn normalize_family_key(font_family: &str) -> String {
    font_family
        .split(',')
        .map(|part| part.trim().trim_matches('"').trim_matches('\'').to_ascii_lowercase())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Advance widths pulled out of a parsed face. The font bytes are kept so
/// glyphs outside ASCII can be resolved on demand.
struct FontMetrics {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    ascii_advances: [u16; 128],
    advance_cache: HashMap<char, Option<u16>>,
}

impl FontMetrics {
    fn parse(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let units_per_em = face.units_per_em().max(1);
        let mut ascii_advances = [0u16; 128];
        for byte in 0u8..=127 {
            if let Some(glyph) = face.glyph_index(byte as char) {
                ascii_advances[byte as usize] = face.glyph_hor_advance(glyph).unwrap_or(0);
            }
        }
        drop(face);
        Some(Self {
            data,
            index,
            units_per_em,
            ascii_advances,
            advance_cache: HashMap::new(),
        })
    }

    fn advance(&mut self, ch: char) -> Option<u16> {
        if ch.is_ascii() {
            return Some(self.ascii_advances[ch as usize]).filter(|advance| *advance > 0);
        }
        if let Some(cached) = self.advance_cache.get(&ch) {
            return *cached;
        }
        let advance = Face::parse(&self.data, self.index).ok().and_then(|face| {
            face.glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
        });
        self.advance_cache.insert(ch, advance);
        advance
    }

    fn width(&mut self, text: &str, font_size: f32) -> f32 {
        let scale = font_size / self.units_per_em as f32;
        let fallback = font_size * 0.56;
        text.chars()
            .filter(|ch| *ch != '\n')
            .map(|ch| match self.advance(ch) {
                Some(advance) => advance as f32 * scale,
                None => fallback,
            })
            .sum::<f32>()
            .max(0.0)
    }
}

/// Estimates the sizes a renderer would report for every state and transition.
#[derive(Debug, Clone, Default)]
pub struct Measurer {
    config: MeasureConfig,
}

impl Measurer {
    pub fn new(config: MeasureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MeasureConfig {
        &self.config
    }

    pub fn text_width(&self, text: &str) -> f32 {
        let estimate = || text.chars().count() as f32 * self.config.font_size * self.config.fallback_char_width;
        if !self.config.system_fonts {
            return estimate();
        }
        measure_text_width(text, self.config.font_size, &self.config.font_family).unwrap_or_else(estimate)
    }

    fn line_height(&self) -> f32 {
        self.config.font_size * self.config.line_height
    }

    fn block(&self, lines: &[String], min_width: f32) -> Size {
        let widest = lines.iter().map(|line| self.text_width(line)).fold(0.0, f32::max);
        let width = (widest + 2.0 * self.config.padding_x).max(min_width);
        let height = lines.len().max(1) as f32 * self.line_height() + 2.0 * self.config.padding_y;
        Size::new(width.ceil(), height.ceil())
    }

    /// Name line followed by entry actions, exit actions and assertions. The
    /// header band grows with the block and becomes the top padding children
    /// are packed below.
    pub fn measure_state(&self, flow: &Flow, state: &State) -> Size {
        let mut lines = vec![state.name.clone()];
        lines.extend(state.entry_actions.iter().map(|action| {
            format!("entry / {}", display_name(flow, &FlowItemRef::Action(action.clone())))
        }));
        lines.extend(state.exit_actions.iter().map(|action| {
            format!("exit / {}", display_name(flow, &FlowItemRef::Action(action.clone())))
        }));
        lines.extend(
            state
                .assertions
                .iter()
                .map(|assertion| display_name(flow, &FlowItemRef::Assertion(assertion.clone())).to_string()),
        );

        let block = self.block(&lines, self.config.min_state_width);
        let inset = self.config.container_padding;
        let header = block.height.max(self.config.header_height);
        Size::new(block.width, header + inset).with_padding(Padding {
            top: header + inset,
            bottom: inset,
            left: inset,
            right: inset,
        })
    }

    /// Event name (or "Always"), then the guard in brackets, then actions.
    pub fn measure_transition(&self, flow: &Flow, transition: &Transition) -> Size {
        let mut lines = vec![transition_label(flow, transition).to_string()];
        if let Some(condition) = &transition.condition {
            lines.push(format!(
                "[{}]",
                display_name(flow, &FlowItemRef::Condition(condition.clone()))
            ));
        }
        lines.extend(
            transition
                .actions
                .iter()
                .map(|action| display_name(flow, &FlowItemRef::Action(action.clone())).to_string()),
        );
        self.block(&lines, self.config.min_transition_width)
    }

    /// Size reports for every materialized state (the flow wrapper included)
    /// and every transition, in declaration order.
    pub fn measure_full_flow(&self, full: &FullFlow) -> Vec<(PositionedItemId, Size)> {
        let flow = &full.flow;
        let mut reports = Vec::new();
        for (state_id, state) in flow.states.iter() {
            reports.push((PositionedItemId::state(state_id), self.measure_state(flow, state)));
        }
        for (state_id, state) in flow.states.iter() {
            reports.extend(self.transition_reports(flow, state_id, &state.transitions));
        }
        reports
    }

    pub fn measure_flow(&self, flow: &Flow) -> Vec<(PositionedItemId, Size)> {
        self.measure_full_flow(&materialize_default(flow))
    }

    pub fn size_map(&self, flow: &Flow) -> SizeMap {
        self.measure_flow(flow).into_iter().collect()
    }

    fn transition_reports<'a>(
        &'a self,
        flow: &'a Flow,
        source: &'a StateId,
        transitions: &'a [Transition],
    ) -> impl Iterator<Item = (PositionedItemId, Size)> + 'a {
        transitions.iter().enumerate().map(move |(index, transition)| {
            (
                PositionedItemId::transition(source, index, transition.target.as_ref()),
                self.measure_transition(flow, transition),
            )
        })
    }
}
