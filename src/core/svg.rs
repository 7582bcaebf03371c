//! Small SVG writer shared by the dashboard panels.

use std::fmt::Write as _;

pub const FRAME_WIDTH: u32 = 800;
pub const FRAME_HEIGHT: u32 = 480;

pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientAxis {
    /// Left to right.
    Horizontal,
    /// Bottom to top, used for chart fills.
    Vertical,
}

pub struct SvgDocument {
    width: u32,
    height: u32,
    defs: String,
    body: String,
}

impl SvgDocument {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            defs: String::new(),
            body: String::new(),
        }
    }

    pub fn frame() -> Self {
        Self::new(FRAME_WIDTH, FRAME_HEIGHT)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn push(&mut self, element: impl AsRef<str>) {
        self.body.push_str(element.as_ref());
        self.body.push('\n');
    }

    pub fn push_def(&mut self, element: impl AsRef<str>) {
        self.defs.push_str(element.as_ref());
        self.defs.push('\n');
    }

    /// `stops` are `(offset_percent, colour)` pairs.
    pub fn linear_gradient(&mut self, id: &str, axis: GradientAxis, stops: &[(f64, &str)]) {
        let (x1, y1, x2, y2) = match axis {
            GradientAxis::Horizontal => ("0%", "0%", "100%", "0%"),
            GradientAxis::Vertical => ("0%", "100%", "0%", "0%"),
        };
        let mut def = format!(
            r#"<linearGradient id="{}" x1="{}" y1="{}" x2="{}" y2="{}">"#,
            id, x1, y1, x2, y2
        );
        for (offset, color) in stops {
            let _ = write!(
                def,
                r#"<stop offset="{:.1}%" style="stop-color:{};stop-opacity:1"/>"#,
                offset, color
            );
        }
        def.push_str("</linearGradient>");
        self.push_def(def);
    }

    pub fn text(&mut self, x: f64, y: f64, size: u32, anchor: &str, style: &str, content: &str) {
        self.push(format!(
            r#"<text x="{}" y="{}" font-family="Arial" font-size="{}" text-anchor="{}" {}>{}</text>"#,
            x,
            y,
            size,
            anchor,
            style,
            escape_text(content)
        ));
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str, width: f64) {
        self.push(format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="{}"/>"#,
            x1, y1, x2, y2, stroke, width
        ));
    }

    /// Rounded container with a clipped gradient fill of `fill_percent`.
    /// The gradient spans the whole bar so the visible colour shows the level.
    pub fn gauge_bar(&mut self, gauge: &GaugeBar, fill_percent: f64) {
        let inset = gauge.inset;
        let inner_width = gauge.width - inset * 2.0;
        let inner_height = gauge.height - inset * 2.0;
        let fill_width = inner_width * (fill_percent.clamp(0.0, 100.0) / 100.0);
        self.gauge_span(gauge, 0.0, fill_width, inner_height);
    }

    /// Like [`gauge_bar`](Self::gauge_bar) but fills only `[from, to]` percent.
    pub fn range_bar(&mut self, gauge: &GaugeBar, from_percent: f64, to_percent: f64) {
        let inset = gauge.inset;
        let inner_width = gauge.width - inset * 2.0;
        let inner_height = gauge.height - inset * 2.0;
        let from = from_percent.clamp(0.0, 100.0);
        let to = to_percent.clamp(from, 100.0);

        let mut start = inner_width * from / 100.0;
        let mut span = inner_width * (to - from) / 100.0;
        // 至少為正方形，置中且不超出邊界
        if span < inner_height {
            let difference = inner_height - span;
            start = (start - difference / 2.0).clamp(0.0, (inner_width - inner_height).max(0.0));
            span = inner_height;
        }
        self.gauge_span(gauge, start, span, inner_height);
    }

    fn gauge_span(&mut self, gauge: &GaugeBar, start: f64, span: f64, inner_height: f64) {
        let inset = gauge.inset;
        self.push(format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="white" stroke="black" stroke-width="2" rx="3"/>"#,
            gauge.x, gauge.y, gauge.width, gauge.height
        ));
        self.push_def(format!(
            r#"<clipPath id="{}"><rect x="{}" y="{}" width="{}" height="{}" rx="1"/></clipPath>"#,
            gauge.clip_id,
            gauge.x + inset + start,
            gauge.y + inset,
            span,
            inner_height
        ));
        self.push(format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="url(#{})" clip-path="url(#{})" rx="1"/>"#,
            gauge.x + inset,
            gauge.y + inset,
            gauge.width - inset * 2.0,
            inner_height,
            gauge.gradient_id,
            gauge.clip_id
        ));
    }

    /// "Battery:" label plus red-to-green gauge. Unknown levels show as 50%.
    pub fn battery_gauge(&mut self, x: f64, y: f64, battery_pct: Option<u8>) {
        self.linear_gradient(
            "batteryGradient",
            GradientAxis::Horizontal,
            &[(0.0, "red"), (100.0, "green")],
        );
        self.text(x - 5.0, y + 10.0, 12, "end", r#"fill="black""#, "Battery:");
        let gauge = GaugeBar {
            x,
            y,
            width: 100.0,
            height: 12.0,
            inset: 2.0,
            gradient_id: "batteryGradient".to_string(),
            clip_id: "batteryClip".to_string(),
        };
        self.gauge_bar(&gauge, battery_pct.unwrap_or(50).min(100) as f64);
    }

    pub fn finish(self) -> String {
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        svg.push('\n');
        if !self.defs.is_empty() {
            svg.push_str("<defs>\n");
            svg.push_str(&self.defs);
            svg.push_str("</defs>\n");
        }
        let _ = writeln!(
            svg,
            r#"<rect width="{}" height="{}" fill="white"/>"#,
            self.width, self.height
        );
        svg.push_str(&self.body);
        svg.push_str("</svg>");
        svg
    }
}

#[derive(Debug, Clone)]
pub struct GaugeBar {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub inset: f64,
    pub gradient_id: String,
    pub clip_id: String,
}

impl GaugeBar {
    pub fn new(x: f64, y: f64, width: f64, height: f64, gradient_id: &str, clip_id: &str) -> Self {
        Self {
            x,
            y,
            width,
            height,
            inset: 2.0,
            gradient_id: gradient_id.to_string(),
            clip_id: clip_id.to_string(),
        }
    }
}

/// Full-frame document with a centred error message.
pub fn error_svg(message: &str) -> String {
    let mut doc = SvgDocument::frame();
    doc.text(
        FRAME_WIDTH as f64 / 2.0,
        FRAME_HEIGHT as f64 / 2.0,
        20,
        "middle",
        r#"fill="black""#,
        &format!("Error: {}", message),
    );
    doc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("S&P <500>"), "S&amp;P &lt;500&gt;");
        assert_eq!(escape_text("plain"), "plain");
    }

    #[test]
    fn test_document_structure() {
        let mut doc = SvgDocument::new(100, 50);
        doc.linear_gradient("g", GradientAxis::Vertical, &[(0.0, "green"), (100.0, "red")]);
        doc.line(0.0, 0.0, 10.0, 10.0, "black", 1.0);
        let svg = doc.finish();

        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50" viewBox="0 0 100 50">"#));
        assert!(svg.contains(r#"<linearGradient id="g" x1="0%" y1="100%" x2="0%" y2="0%">"#));
        assert!(svg.contains(r#"<stop offset="100.0%" style="stop-color:red;stop-opacity:1"/>"#));
        assert!(svg.find("</defs>").unwrap() < svg.find("<line").unwrap());
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_gauge_bar_clamps_fill() {
        let mut doc = SvgDocument::new(200, 50);
        let gauge = GaugeBar::new(10.0, 10.0, 104.0, 20.0, "grad", "clip");
        doc.gauge_bar(&gauge, 150.0);
        let svg = doc.finish();

        assert!(svg.contains(r#"<clipPath id="clip"><rect x="12" y="12" width="100" height="16" rx="1"/></clipPath>"#));
    }

    #[test]
    fn test_range_bar_minimum_square() {
        let mut doc = SvgDocument::new(200, 50);
        let gauge = GaugeBar::new(0.0, 0.0, 104.0, 16.0, "grad", "clip");
        doc.range_bar(&gauge, 50.0, 50.0);
        let svg = doc.finish();

        // 12px wide, centred on 50%
        assert!(svg.contains(r#"<rect x="46" y="2" width="12" height="12" rx="1"/>"#));
    }

    #[test]
    fn test_battery_defaults_to_half() {
        let mut doc = SvgDocument::new(800, 480);
        doc.battery_gauge(75.0, 460.0, None);
        let svg = doc.finish();

        assert!(svg.contains("Battery:"));
        assert!(svg.contains(r#"<clipPath id="batteryClip"><rect x="77" y="462" width="48" height="8" rx="1"/></clipPath>"#));
    }

    #[test]
    fn test_error_svg_escapes_message() {
        let svg = error_svg("bad <key>");
        assert!(svg.contains("Error: bad &lt;key&gt;"));
    }
}
