//! Parametric paths through control points
//!
//! A [`Spline`] keeps its per-segment length cache and total length in sync
//! with its inputs: every mutator that changes the path recomputes them.

use strata_core::{read_savable_list, CapsuleError, InputCapsule, OutputCapsule, Savable};

use crate::curve::{
    bezier_length, catmull_rom_length, interpolate_bezier, interpolate_catmull_rom,
    interpolate_nurbs, prepare_nurbs_knots, validate_knots,
};
use crate::error::{SplineError, SplineResult};
use crate::vector::{Vec3, Vec4};

/// Samples used to approximate NURBS arc length
const NURB_LENGTH_SAMPLES: u32 = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SplineType {
    Linear,
    #[default]
    CatmullRom,
    Bezier,
    Nurb,
}

impl SplineType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::CatmullRom => "CatmullRom",
            Self::Bezier => "Bezier",
            Self::Nurb => "Nurb",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Linear" => Some(Self::Linear),
            "CatmullRom" => Some(Self::CatmullRom),
            "Bezier" => Some(Self::Bezier),
            "Nurb" => Some(Self::Nurb),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Spline {
    control_points: Vec<Vec3>,
    spline_type: SplineType,
    curve_tension: f32,
    cycle: bool,
    segments_length: Vec<f32>,
    total_length: f32,
    /// Control points padded with one phantom point at each end
    catmull_rom_points: Vec<Vec3>,
    weights: Vec<f32>,
    knots: Vec<f32>,
    basis_order: usize,
}

impl Default for Spline {
    fn default() -> Self {
        Self {
            control_points: Vec::new(),
            spline_type: SplineType::CatmullRom,
            curve_tension: 0.5,
            cycle: false,
            segments_length: Vec::new(),
            total_length: 0.0,
            catmull_rom_points: Vec::new(),
            weights: Vec::new(),
            knots: Vec::new(),
            basis_order: 0,
        }
    }
}

impl Spline {
    /// Build a non-NURBS spline; a cyclic spline repeats its first point at the end
    pub fn new(
        spline_type: SplineType,
        control_points: &[Vec3],
        curve_tension: f32,
        cycle: bool,
    ) -> SplineResult<Self> {
        if spline_type == SplineType::Nurb {
            return Err(SplineError::MissingKnots);
        }
        let mut spline = Self {
            spline_type,
            curve_tension,
            cycle,
            ..Self::default()
        };
        for &point in control_points {
            spline.push_point(point);
        }
        spline.compute_total_length()?;
        Ok(spline)
    }

    /// Build a NURBS spline; `w` of each control point is its weight
    ///
    /// The basis order is `knots.len() - control_points.len()`. Repeated knots
    /// are spread apart before use.
    pub fn nurb(control_points: &[Vec4], knots: &[f32]) -> SplineResult<Self> {
        validate_knots(knots)?;
        if knots.len() <= control_points.len() {
            return Err(SplineError::InvalidKnotCount {
                knots: knots.len(),
                weights: control_points.len(),
            });
        }

        let mut knots = knots.to_vec();
        let basis_order = knots.len() - control_points.len();
        prepare_nurbs_knots(&mut knots);

        let mut spline = Self {
            spline_type: SplineType::Nurb,
            control_points: control_points.iter().map(|p| p.xyz()).collect(),
            weights: control_points.iter().map(|p| p.w).collect(),
            knots,
            basis_order,
            ..Self::default()
        };
        spline.compute_total_length()?;
        Ok(spline)
    }

    /// Append a point, keeping a cyclic spline closed
    pub fn add_control_point(&mut self, point: Vec3) -> SplineResult<()> {
        self.push_point(point);
        if self.control_points.len() > 1 {
            self.compute_total_length()?;
        }
        Ok(())
    }

    fn push_point(&mut self, point: Vec3) {
        if self.control_points.len() > 2 && self.cycle {
            self.control_points.pop();
        }
        self.control_points.push(point);
        if self.control_points.len() >= 2 && self.cycle {
            self.control_points.push(self.control_points[0]);
        }
    }

    /// Remove the first control point equal to `point`; returns whether one was found
    pub fn remove_control_point(&mut self, point: Vec3) -> SplineResult<bool> {
        let Some(index) = self.control_points.iter().position(|p| *p == point) else {
            return Ok(false);
        };
        self.control_points.remove(index);
        if self.control_points.len() > 1 {
            self.compute_total_length()?;
        } else {
            self.clear_lengths();
        }
        Ok(true)
    }

    pub fn clear_control_points(&mut self) {
        self.control_points.clear();
        self.catmull_rom_points.clear();
        self.clear_lengths();
    }

    fn clear_lengths(&mut self) {
        self.segments_length.clear();
        self.total_length = 0.0;
    }

    /// Number of segments the length cache holds for the current points
    pub fn segment_count(&self) -> usize {
        let n = self.control_points.len();
        match self.spline_type {
            SplineType::Linear | SplineType::CatmullRom => n.saturating_sub(1),
            SplineType::Bezier => n.saturating_sub(1) / 3,
            SplineType::Nurb => usize::from(n > 1),
        }
    }

    /// Recompute the segment length cache and total length
    pub fn compute_total_length(&mut self) -> SplineResult<f32> {
        self.clear_lengths();
        match self.spline_type {
            SplineType::Linear => {
                for pair in self.control_points.windows(2) {
                    self.segments_length.push((pair[1] - pair[0]).length());
                }
            }
            SplineType::CatmullRom => {
                self.init_catmull_rom_points();
                if self.control_points.len() > 1 {
                    for quad in self.catmull_rom_points.windows(4) {
                        self.segments_length.push(catmull_rom_length(
                            quad[0],
                            quad[1],
                            quad[2],
                            quad[3],
                            0.0,
                            1.0,
                            self.curve_tension,
                        ));
                    }
                }
            }
            SplineType::Bezier => {
                for segment in 0..self.segment_count() {
                    let p = &self.control_points[segment * 3..segment * 3 + 4];
                    self.segments_length.push(bezier_length(p[0], p[1], p[2], p[3]));
                }
            }
            SplineType::Nurb => {
                if self.control_points.len() > 1 {
                    let length = self.sample_nurb_length()?;
                    self.segments_length.push(length);
                }
            }
        }
        self.total_length = self.segments_length.iter().sum();
        Ok(self.total_length)
    }

    fn init_catmull_rom_points(&mut self) {
        self.catmull_rom_points.clear();
        let list = &self.control_points;
        if list.len() < 2 {
            return;
        }
        let last = list.len() - 1;
        let head = if self.cycle {
            list[list.len() - 2]
        } else {
            list[0] - (list[1] - list[0])
        };
        let tail = if self.cycle {
            list[1]
        } else {
            list[last] + (list[last] - list[last - 1])
        };
        self.catmull_rom_points.push(head);
        self.catmull_rom_points.extend_from_slice(list);
        self.catmull_rom_points.push(tail);
    }

    fn sample_nurb_length(&self) -> SplineResult<f32> {
        let min = self.min_nurb_knot();
        let max = self.max_nurb_knot();
        let mut previous = self.evaluate_nurb(min)?;
        let mut length = 0.0;
        for step in 1..=NURB_LENGTH_SAMPLES {
            let u = min + (max - min) * step as f32 / NURB_LENGTH_SAMPLES as f32;
            let point = self.evaluate_nurb(u)?;
            length += (point - previous).length();
            previous = point;
        }
        Ok(length)
    }

    /// Point at `value` in `[0, 1]` along `segment`
    ///
    /// Bezier segments start at control point `3 * segment`. Nurb splines
    /// ignore `segment` and take `value` as a knot parameter in
    /// `[min_nurb_knot, max_nurb_knot]`.
    pub fn interpolate(&self, value: f32, segment: usize) -> SplineResult<Vec3> {
        if self.spline_type == SplineType::Nurb {
            return self.evaluate_nurb(value);
        }

        let count = self.segment_count();
        if segment >= count {
            return Err(SplineError::SegmentOutOfRange { segment, count });
        }

        Ok(match self.spline_type {
            SplineType::Linear => {
                self.control_points[segment].lerp(self.control_points[segment + 1], value)
            }
            SplineType::CatmullRom => {
                let p = &self.catmull_rom_points[segment..segment + 4];
                interpolate_catmull_rom(value, self.curve_tension, p[0], p[1], p[2], p[3])
            }
            SplineType::Bezier => {
                let p = &self.control_points[segment * 3..segment * 3 + 4];
                interpolate_bezier(value, p[0], p[1], p[2], p[3])
            }
            SplineType::Nurb => self.evaluate_nurb(value)?,
        })
    }

    fn evaluate_nurb(&self, value: f32) -> SplineResult<Vec3> {
        let min = self.min_nurb_knot();
        let max = self.max_nurb_knot();
        let mut u = value;
        if u < min || u > max {
            log::warn!("NURBS parameter {} outside knot span [{}, {}], clamping", u, min, max);
            u = u.clamp(min, max);
        }
        // basis functions are half-open, the span end evaluates just inside it
        if u >= max {
            u = max - (max - min) * f32::EPSILON;
        }
        interpolate_nurbs(
            u,
            &self.control_points,
            &self.weights,
            &self.knots,
            self.basis_order,
        )
    }

    pub fn control_points(&self) -> &[Vec3] {
        &self.control_points
    }

    pub fn segments_length(&self) -> &[f32] {
        &self.segments_length
    }

    pub fn total_length(&self) -> f32 {
        self.total_length
    }

    pub fn spline_type(&self) -> SplineType {
        self.spline_type
    }

    /// Switch curve type; Nurb needs the knots of a spline built with [`Spline::nurb`]
    pub fn set_type(&mut self, spline_type: SplineType) -> SplineResult<()> {
        if spline_type == SplineType::Nurb && self.knots.is_empty() {
            return Err(SplineError::MissingKnots);
        }
        self.spline_type = spline_type;
        self.compute_total_length()?;
        Ok(())
    }

    pub fn curve_tension(&self) -> f32 {
        self.curve_tension
    }

    pub fn set_curve_tension(&mut self, tension: f32) -> SplineResult<()> {
        self.curve_tension = tension;
        if self.spline_type == SplineType::CatmullRom && !self.control_points.is_empty() {
            self.compute_total_length()?;
        }
        Ok(())
    }

    pub fn is_cycle(&self) -> bool {
        self.cycle
    }

    /// Open or close the path; ignored for Nurb splines
    pub fn set_cycle(&mut self, cycle: bool) -> SplineResult<()> {
        if self.spline_type == SplineType::Nurb {
            return Ok(());
        }
        if self.control_points.len() >= 2 {
            if self.cycle && !cycle {
                self.control_points.pop();
            }
            if !self.cycle && cycle {
                self.control_points.push(self.control_points[0]);
            }
            self.cycle = cycle;
            self.compute_total_length()?;
        } else {
            self.cycle = cycle;
        }
        Ok(())
    }

    pub fn knots(&self) -> &[f32] {
        &self.knots
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// NURBS basis order (degree + 1)
    pub fn basis_order(&self) -> usize {
        self.basis_order
    }

    /// Lowest parameter with full basis support
    pub fn min_nurb_knot(&self) -> f32 {
        self.knots
            .get(self.basis_order.saturating_sub(1))
            .copied()
            .unwrap_or(0.0)
    }

    /// Highest parameter with full basis support
    pub fn max_nurb_knot(&self) -> f32 {
        self.knots.get(self.weights.len()).copied().unwrap_or(0.0)
    }
}

impl Savable for Spline {
    fn write(&self, out: &mut dyn OutputCapsule) {
        let points: Vec<&dyn Savable> = self.control_points.iter().map(|p| p as &dyn Savable).collect();
        out.write_savable_list("controlPoints", &points);
        out.write_string("type", Some(self.spline_type.name()), Some(SplineType::CatmullRom.name()));
        out.write_f32_array("segmentsLength", Some(self.segments_length.as_slice()));
        out.write_f32("totalLength", self.total_length, 0.0);
        let padded: Vec<&dyn Savable> = self
            .catmull_rom_points
            .iter()
            .map(|p| p as &dyn Savable)
            .collect();
        out.write_savable_list("CRControlPoints", &padded);
        out.write_f32("curveTension", self.curve_tension, 0.5);
        out.write_bool("cycle", self.cycle, false);
        if !self.knots.is_empty() {
            out.write_f32_array("knots", Some(self.knots.as_slice()));
            out.write_f32_array("weights", Some(self.weights.as_slice()));
        }
        out.write_i32("basisFunctionDegree", self.basis_order as i32, 0);
    }

    fn read(input: &dyn InputCapsule) -> strata_core::Result<Self> {
        let type_name = input.read_string("type", Some(SplineType::CatmullRom.name()))?;
        let spline_type = type_name
            .as_deref()
            .and_then(SplineType::from_name)
            .ok_or_else(|| CapsuleError::InvalidValue {
                field: "type".into(),
                reason: format!("unknown spline type {:?}", type_name),
            })?;

        let basis_order = input.read_i32("basisFunctionDegree", 0)?;
        let mut spline = Self {
            control_points: read_savable_list(input, "controlPoints")?,
            spline_type,
            curve_tension: input.read_f32("curveTension", 0.5)?,
            cycle: input.read_bool("cycle", false)?,
            knots: input.read_f32_array("knots")?.unwrap_or_default(),
            weights: input.read_f32_array("weights")?.unwrap_or_default(),
            basis_order: usize::try_from(basis_order).map_err(|_| CapsuleError::InvalidValue {
                field: "basisFunctionDegree".into(),
                reason: format!("negative order {}", basis_order),
            })?,
            ..Self::default()
        };

        spline
            .compute_total_length()
            .map_err(|e| CapsuleError::InvalidValue {
                field: "controlPoints".into(),
                reason: e.to_string(),
            })?;
        Ok(spline)
    }
}
