//! Geometry and text of a player's radar chart. Rendering is left to the
//! caller; everything here is plain data.

use std::f64::consts::{FRAC_PI_2, PI};

use serde::Serialize;

use crate::summarize::{Histogram, PlayerSummary};

pub const RINGS: [f64; 4] = [0.25, 0.5, 0.75, 1.0];
pub const LABEL_RADIUS: f64 = 1.2;
pub const ANNOTATION_RADIUS: f64 = 1.075;
pub const DEFAULT_SUBTITLE: &str = "Passing metrics";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarWedge {
    pub label: String,
    /// Centre angle in radians; the first wedge points straight up.
    pub theta: f64,
    pub width: f64,
    pub histogram: Histogram,
    /// Opacity of each histogram bin, relative to the fullest bin.
    pub shading: Vec<f64>,
    pub quantiles: [f64; 3],
    /// `median (lo, hi)`, three significant figures each.
    pub annotation: String,
    /// Text rotation in degrees, flipped on the lower half so it never
    /// reads upside down.
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarChart {
    pub player: String,
    pub squad: String,
    pub player_index: usize,
    pub title: String,
    pub subtitle: String,
    pub rings: [f64; 4],
    pub wedges: Vec<RadarWedge>,
}

pub struct RadarHeader<'a> {
    pub player: &'a str,
    pub squad: &'a str,
    pub player_index: usize,
    pub minutes: f64,
    pub league_season: &'a str,
    pub subtitle: &'a str,
}

impl RadarChart {
    /// Lays out one wedge per summary, in the given order.
    pub fn build(header: RadarHeader<'_>, summaries: Vec<(String, PlayerSummary)>) -> Self {
        let n = summaries.len().max(1) as f64;
        let width = 2.0 * PI / n;
        let wedges = summaries
            .into_iter()
            .enumerate()
            .map(|(j, (label, summary))| {
                let theta = FRAC_PI_2 + j as f64 * width;
                let [lo, mid, hi] = summary.quantiles;
                RadarWedge {
                    label,
                    theta,
                    width,
                    shading: summary.histogram.intensities(),
                    histogram: summary.histogram,
                    quantiles: summary.quantiles,
                    annotation: format!("{} ({}, {})", format_sig3(mid), format_sig3(lo), format_sig3(hi)),
                    rotation: text_rotation(theta),
                }
            })
            .collect();

        Self {
            player: header.player.to_string(),
            squad: header.squad.to_string(),
            player_index: header.player_index,
            title: format!("{} ({}), {}", header.player, header.squad, header.league_season),
            subtitle: format!(
                "{}; 90s played: {}",
                header.subtitle,
                format_nineties(header.minutes / 90.0)
            ),
            rings: RINGS,
            wedges,
        }
    }
}

fn text_rotation(theta: f64) -> f64 {
    let deg = theta.to_degrees() - 90.0;
    if theta > PI && theta < 2.0 * PI {
        deg - 180.0
    } else {
        deg
    }
}

fn format_nineties(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Three significant figures. Fixed notation keeps at least one decimal
/// digit, so magnitudes of 100 and up (or below 1e-4) switch to
/// `1.23e+02` form.
pub fn format_sig3(x: f64) -> String {
    if !x.is_finite() {
        return format!("{x}");
    }
    if x == 0.0 {
        return "0.0".to_string();
    }
    let sci = format!("{x:.2e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp = exp.parse::<i32>().unwrap_or(0);
    if !(-4..2).contains(&exp) {
        let mantissa = strip_zeros(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exp.abs());
    }
    let decimals = (2 - exp) as usize;
    let fixed = format!("{x:.decimals$}");
    let fixed = strip_zeros(&fixed);
    if fixed.contains('.') {
        fixed.to_string()
    } else {
        format!("{fixed}.0")
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
