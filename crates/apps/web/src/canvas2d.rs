//! Canvas-2D fallback: orthographic outline, graticule, country fills and
//! gradient points. Arcs and ripples are WebGL-only.

use std::f64::consts::TAU;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasGradient, CanvasRenderingContext2d, CanvasWindingRule, HtmlCanvasElement};

use compute::VisiblePoint;
use foundation::Rgba;
use gpu::{
    BackendKind, CachedPaths, CountryGroup, FramePlan, PathCache, RenderBackend, RenderCommand,
    RenderError, ScreenPath,
};
use layers::Palette;
use scene::Retired;

const GLOBE_STROKE_WIDTH: f64 = 1.5;
const GRATICULE_WIDTH: f64 = 0.5;
const COUNTRY_STROKE_WIDTH: f64 = 0.3;

pub struct Canvas2dBackend {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    paths: PathCache,
    groups: Vec<CountryGroup>,
    palette: Palette,
    destroyed: bool,
}

pub fn rgba_css(c: Rgba) -> String {
    let r = (c[0].clamp(0.0, 1.0) * 255.0).round() as u32;
    let g = (c[1].clamp(0.0, 1.0) * 255.0).round() as u32;
    let b = (c[2].clamp(0.0, 1.0) * 255.0).round() as u32;
    let a = c[3].clamp(0.0, 1.0);
    format!("rgba({r},{g},{b},{a})")
}

fn ctx_set_fill_style(ctx: &CanvasRenderingContext2d, value: &JsValue) {
    let _ = js_sys::Reflect::set(ctx.as_ref(), &JsValue::from_str("fillStyle"), value);
}

fn ctx_set_stroke_style(ctx: &CanvasRenderingContext2d, value: &str) {
    let _ = js_sys::Reflect::set(
        ctx.as_ref(),
        &JsValue::from_str("strokeStyle"),
        &JsValue::from_str(value),
    );
}

fn js_err(e: JsValue) -> RenderError {
    RenderError::Backend(format!("{e:?}"))
}

fn trace(ctx: &CanvasRenderingContext2d, path: &ScreenPath, close: bool) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    ctx.move_to(first[0] as f64, first[1] as f64);
    for p in rest {
        ctx.line_to(p[0] as f64, p[1] as f64);
    }
    if close {
        ctx.close_path();
    }
}

fn point_gradient(
    ctx: &CanvasRenderingContext2d,
    point: &VisiblePoint,
) -> Result<CanvasGradient, JsValue> {
    let (x, y) = (point.x as f64, point.y as f64);
    let [r, g, b] = point.color;
    let gradient = ctx.create_radial_gradient(x, y, 0.0, x, y, point.radius as f64 * 2.0)?;
    gradient.add_color_stop(0.0, &rgba_css([r, g, b, 1.0]))?;
    gradient.add_color_stop(0.5, &rgba_css([r, g, b, 0.5]))?;
    gradient.add_color_stop(1.0, &rgba_css([r, g, b, 0.0]))?;
    Ok(gradient)
}

impl Canvas2dBackend {
    pub fn new(canvas: HtmlCanvasElement, palette: Palette) -> Result<Self, JsValue> {
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
            .dyn_into::<CanvasRenderingContext2d>()?;
        Ok(Self {
            canvas,
            ctx,
            paths: PathCache::new(),
            groups: Vec::new(),
            palette,
            destroyed: false,
        })
    }

    pub fn set_country_groups(&mut self, groups: Vec<CountryGroup>) {
        self.groups = groups;
        self.paths.invalidate();
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
    }

    pub fn path_rebuilds(&self) -> u64 {
        self.paths.rebuilds()
    }

    fn draw_globe(ctx: &CanvasRenderingContext2d, palette: &Palette, paths: &CachedPaths) -> Result<(), JsValue> {
        let sphere = paths.sphere;
        ctx.begin_path();
        ctx.arc(
            sphere.center[0] as f64,
            sphere.center[1] as f64,
            sphere.radius as f64,
            0.0,
            TAU,
        )?;
        ctx_set_fill_style(ctx, &JsValue::from_str(palette.globe_fill));
        ctx.fill();
        ctx_set_stroke_style(ctx, palette.globe_stroke);
        ctx.set_line_width(GLOBE_STROKE_WIDTH);
        ctx.stroke();

        ctx.begin_path();
        for line in &paths.graticule {
            trace(ctx, line, false);
        }
        ctx_set_stroke_style(ctx, palette.graticule_stroke);
        ctx.set_line_width(GRATICULE_WIDTH);
        ctx.stroke();

        for group in &paths.country_fills {
            ctx.begin_path();
            for ring in &group.rings {
                trace(ctx, ring, true);
            }
            ctx_set_fill_style(ctx, &JsValue::from_str(&rgba_css(group.fill)));
            ctx.fill_with_canvas_winding_rule(CanvasWindingRule::Evenodd);
        }

        ctx.begin_path();
        for outline in &paths.country_stroke {
            trace(ctx, outline, false);
        }
        ctx_set_stroke_style(ctx, palette.country_stroke);
        ctx.set_line_width(COUNTRY_STROKE_WIDTH);
        ctx.stroke();
        Ok(())
    }

    fn draw_points(ctx: &CanvasRenderingContext2d, points: &[VisiblePoint]) -> Result<(), JsValue> {
        for point in points {
            let (x, y, radius) = (point.x as f64, point.y as f64, point.radius as f64);
            let gradient = point_gradient(ctx, point)?;
            ctx_set_fill_style(ctx, gradient.as_ref());
            ctx.begin_path();
            ctx.arc(x, y, radius * 2.0, 0.0, TAU)?;
            ctx.fill();

            let [r, g, b] = point.color;
            ctx_set_fill_style(ctx, &JsValue::from_str(&rgba_css([r, g, b, 1.0])));
            ctx.begin_path();
            ctx.arc(x, y, radius * 0.6, 0.0, TAU)?;
            ctx.fill();
        }
        Ok(())
    }
}

impl RenderBackend for Canvas2dBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Canvas2d
    }

    fn is_ready(&self) -> bool {
        !self.destroyed
    }

    fn update_size(&mut self, _width: u32, _height: u32) {
        // The path cache keys on the viewport, so the next frame rebuilds.
    }

    fn render(&mut self, plan: &FramePlan<'_>) -> Result<(), RenderError> {
        if self.destroyed {
            return Err(RenderError::NotReady);
        }
        let Self {
            canvas,
            ctx,
            paths,
            groups,
            palette,
            ..
        } = self;
        ctx.clear_rect(0.0, 0.0, canvas.width() as f64, canvas.height() as f64);

        for cmd in &plan.commands {
            match cmd {
                RenderCommand::Sphere => {
                    let cached = paths.paths(&plan.projection, groups);
                    Self::draw_globe(ctx, palette, cached).map_err(js_err)?;
                }
                RenderCommand::Points { points, .. } => {
                    Self::draw_points(ctx, points).map_err(js_err)?;
                }
                RenderCommand::Arc { .. } | RenderCommand::Ripple { .. } => {}
            }
        }
        Ok(())
    }

    fn release(&mut self, _retired: &Retired) {}

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.groups.clear();
        self.paths.invalidate();
        self.ctx.clear_rect(
            0.0,
            0.0,
            self.canvas.width() as f64,
            self.canvas.height() as f64,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_colors_are_clamped_bytes() {
        assert_eq!(rgba_css([1.0, 0.5, 0.0, 0.25]), "rgba(255,128,0,0.25)");
        assert_eq!(rgba_css([2.0, -1.0, 0.2, 1.5]), "rgba(255,0,51,1)");
    }
}
