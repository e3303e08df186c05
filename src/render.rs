use crate::config::{LayoutConfig, RenderConfig};
use crate::ir::LineStyle;
use crate::layout::{
    ConnectorLayout, DiagramLayout, LegendLayout, ObjectLayout, PlaceholderLayout, Point,
    ReceptacleLayout, Rect, RoomLayout, TextLayout,
};
use crate::theme::Theme;
use anyhow::Result;
use std::fmt::Write as _;
use std::path::Path;

/// Maps layout coordinates (y up) onto the SVG canvas (y down).
#[derive(Debug, Clone, Copy)]
struct Canvas {
    left: f32,
    top: f32,
}

impl Canvas {
    fn new(bounds: Rect) -> Self {
        Self {
            left: bounds.x,
            top: bounds.top(),
        }
    }

    fn point(&self, p: Point) -> (f32, f32) {
        (p.x - self.left, self.top - p.y)
    }

    /// Top-left corner plus size, as SVG `<rect>` wants it.
    fn rect(&self, r: Rect) -> (f32, f32, f32, f32) {
        (r.x - self.left, self.top - r.top(), r.width, r.height)
    }
}

pub fn render_svg(diagram: &DiagramLayout, theme: &Theme, config: &LayoutConfig) -> String {
    let canvas = Canvas::new(diagram.bounds);
    let width = diagram.width.max(1.0);
    let height = diagram.height.max(1.0);
    let mut svg = String::new();

    let _ = write!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" width=\"{width:.2}\" height=\"{height:.2}\" viewBox=\"0 0 {width:.2} {height:.2}\">",
    );
    let _ = write!(
        svg,
        "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
        theme.background
    );

    if let Some(instruction) = &diagram.instruction {
        svg.push_str(&text_svg(&canvas, instruction, theme));
    }

    for level in &diagram.levels {
        for room in &level.rooms {
            room_svg(&mut svg, &canvas, room, theme, config);
        }
        for recep in &level.receptacles {
            receptacle_svg(&mut svg, &canvas, recep, theme);
        }
        for object in &level.objects {
            object_svg(&mut svg, &canvas, object, theme, config);
        }
        for connector in &level.connectors {
            connector_svg(&mut svg, &canvas, connector, theme, config);
        }
    }

    for divider in &diagram.dividers {
        let (x1, y) = canvas.point(Point::new(divider.x1, divider.y));
        let (x2, _) = canvas.point(Point::new(divider.x2, divider.y));
        let _ = write!(
            svg,
            "<line x1=\"{x1:.2}\" y1=\"{y:.2}\" x2=\"{x2:.2}\" y2=\"{y:.2}\" stroke=\"{}\" stroke-width=\"{}\"/>",
            theme.divider_color, config.scene.divider_linewidth
        );
    }

    for legend in &diagram.legends {
        legend_svg(&mut svg, &canvas, legend, theme, config);
    }

    if let Some(step) = &diagram.step {
        let (x, y, w, h) = canvas.rect(step.rect);
        let _ = write!(
            svg,
            "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" rx=\"{:.2}\" fill=\"{}\"/>",
            w / 2.0,
            theme.legend_background
        );
        let _ = write!(
            svg,
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{}\" font-size=\"{:.2}\" fill=\"{}\">{}</text>",
            x + w / 2.0,
            y + h / 2.0,
            theme.font_family,
            h / 2.0,
            theme.text_color,
            step.number
        );
    }

    svg.push_str("</svg>");
    svg
}

fn room_svg(svg: &mut String, canvas: &Canvas, room: &RoomLayout, theme: &Theme, config: &LayoutConfig) {
    let (x, y, w, h) = canvas.rect(room.inner);
    let border = if room.bordered {
        format!(
            " stroke=\"{}\" stroke-width=\"{}\"",
            theme.room_border, config.room.border_width
        )
    } else {
        String::new()
    };
    let _ = write!(
        svg,
        "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" rx=\"10\" ry=\"10\" fill=\"{}\"{border}/>",
        theme.room_color
    );
    svg.push_str(&text_svg(canvas, &room.label, theme));
    if let Some(placeholder) = &room.placeholder {
        placeholder_svg(svg, canvas, placeholder, theme);
    }
    for recep in &room.receptacles {
        receptacle_svg(svg, canvas, recep, theme);
    }
    for object in &room.objects {
        object_svg(svg, canvas, object, theme, config);
    }
}

fn placeholder_svg(svg: &mut String, canvas: &Canvas, placeholder: &PlaceholderLayout, theme: &Theme) {
    if !placeholder.visible {
        return;
    }
    let (x, y, w, h) = canvas.rect(placeholder.rect);
    let _ = write!(
        svg,
        "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" rx=\"8\" ry=\"8\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\" stroke-dasharray=\"6 4\"/>",
        theme.placeholder_color
    );
}

fn receptacle_svg(svg: &mut String, canvas: &Canvas, recep: &ReceptacleLayout, theme: &Theme) {
    let (x, y, w, h) = canvas.rect(recep.icon);
    match &recep.icon_path {
        Some(path) => {
            let _ = write!(
                svg,
                "<image x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" preserveAspectRatio=\"none\" href=\"{}\"/>",
                escape_xml(path)
            );
        }
        None => {
            let _ = write!(
                svg,
                "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" fill=\"{}\" fill-opacity=\"0.4\"/>",
                theme.placeholder_color
            );
        }
    }
    placeholder_svg(svg, canvas, &recep.top, theme);
    placeholder_svg(svg, canvas, &recep.center, theme);
    svg.push_str(&text_svg(canvas, &recep.label, theme));

    // State lines go under the label, one per changed attribute.
    let label_height = recep.label.lines.len() as f32 * recep.label.line_height;
    let mut line_y = recep.label.anchor.y - label_height / 2.0 - recep.label.line_height;
    for line in &recep.state_lines {
        let fill = theme
            .state_colors(&line.state)
            .map(|colors| if line.value { &colors.on } else { &colors.off })
            .unwrap_or(&theme.text_color);
        let (tx, ty) = canvas.point(Point::new(recep.label.anchor.x, line_y));
        let text = format!("{}: {}", line.state.trim_start_matches("is_").replace('_', " "), line.value);
        let _ = write!(
            svg,
            "<text x=\"{tx:.2}\" y=\"{ty:.2}\" text-anchor=\"middle\" font-family=\"{}\" font-size=\"{:.2}\" fill=\"{fill}\">{}</text>",
            theme.font_family,
            recep.label.size,
            escape_xml(&text)
        );
        line_y -= recep.label.line_height;
    }
}

fn object_svg(svg: &mut String, canvas: &Canvas, object: &ObjectLayout, theme: &Theme, config: &LayoutConfig) {
    let rounding = config.object.rounding_size;
    if object.on_floor {
        let pad = config.object.on_floor_padding_ratio * object.rect.width;
        let outline = Rect::new(
            object.rect.x - pad,
            object.rect.y - pad,
            object.rect.width + 2.0 * pad,
            object.rect.height + 2.0 * pad,
        );
        let (x, y, w, h) = canvas.rect(outline);
        let _ = write!(
            svg,
            "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" rx=\"{rounding:.2}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\"/>",
            theme.line_color
        );
    }
    let (x, y, w, h) = canvas.rect(object.rect);
    let _ = write!(
        svg,
        "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" rx=\"{rounding:.2}\" fill=\"{}\"/>",
        object.color
    );
    for badge in &object.states {
        let fill = theme
            .state_colors(&badge.state)
            .map(|colors| if badge.value { &colors.on } else { &colors.off })
            .unwrap_or(&theme.text_color);
        let stroke = if badge.changed {
            format!(" stroke=\"{}\" stroke-width=\"2\"", theme.line_color)
        } else {
            String::new()
        };
        let (bx, by, bw, bh) = canvas.rect(badge.rect);
        let _ = write!(
            svg,
            "<rect x=\"{bx:.2}\" y=\"{by:.2}\" width=\"{bw:.2}\" height=\"{bh:.2}\" rx=\"3\" fill=\"{fill}\"{stroke}/>"
        );
    }
    svg.push_str(&text_svg(canvas, &object.label, theme));
}

fn connector_svg(
    svg: &mut String,
    canvas: &Canvas,
    connector: &ConnectorLayout,
    theme: &Theme,
    config: &LayoutConfig,
) {
    let arrow = &config.arrow;
    let (x0, y0) = canvas.point(connector.from);
    let (cx, cy) = canvas.point(connector.control);
    let (x1, y1) = canvas.point(connector.head_base);
    let dash = match connector.style {
        LineStyle::Dotted => " stroke-dasharray=\"2 6\" stroke-linecap=\"round\"",
        LineStyle::Solid => "",
    };
    let _ = write!(
        svg,
        "<path d=\"M {x0:.2} {y0:.2} Q {cx:.2} {cy:.2} {x1:.2} {y1:.2}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{}\"{dash}/>",
        connector.color, arrow.linewidth
    );

    let normal = Point::new(-connector.direction.y, connector.direction.x).scale(arrow.head_width / 2.0);
    let back = connector
        .head_base
        .offset(connector.direction.x * arrow.overhang, connector.direction.y * arrow.overhang);
    let corners = [
        connector.to,
        connector.head_base.offset(normal.x, normal.y),
        back,
        connector.head_base.offset(-normal.x, -normal.y),
    ];
    let points = corners
        .iter()
        .map(|&p| {
            let (x, y) = canvas.point(p);
            format!("{x:.2},{y:.2}")
        })
        .collect::<Vec<_>>()
        .join(" ");
    let _ = write!(svg, "<polygon points=\"{points}\" fill=\"{}\"/>", connector.color);

    if let Some((at, text)) = &connector.label {
        let (lx, ly) = canvas.point(*at);
        let _ = write!(
            svg,
            "<text x=\"{lx:.2}\" y=\"{ly:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
            theme.font_family,
            arrow.label_fontsize,
            theme.text_color,
            escape_xml(text)
        );
    }
}

fn legend_svg(svg: &mut String, canvas: &Canvas, legend: &LegendLayout, theme: &Theme, config: &LayoutConfig) {
    let (x, y, w, h) = canvas.rect(legend.rect);
    let _ = write!(
        svg,
        "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" rx=\"10\" ry=\"10\" fill=\"{}\"/>",
        theme.legend_background
    );
    svg.push_str(&text_svg(canvas, &legend.title, theme));

    let cfg = &config.legend;
    for edge in &legend.edges {
        let (Some(from), Some(to)) = (legend.vertices.get(edge.from), legend.vertices.get(edge.to)) else {
            continue;
        };
        let (x1, y1) = canvas.point(from.anchor);
        let (x2, y2) = canvas.point(to.anchor);
        let dash = match edge.style {
            LineStyle::Dotted => " stroke-dasharray=\"2 6\" stroke-linecap=\"round\"",
            LineStyle::Solid => "",
        };
        let _ = write!(
            svg,
            "<line x1=\"{x1:.2}\" y1=\"{y1:.2}\" x2=\"{x2:.2}\" y2=\"{y2:.2}\" stroke=\"{}\" stroke-width=\"{}\"{dash}/>",
            theme.line_color, cfg.linewidth
        );
        for (px, py) in [(x1, y1), (x2, y2)] {
            let _ = write!(
                svg,
                "<circle cx=\"{px:.2}\" cy=\"{py:.2}\" r=\"{:.2}\" fill=\"{}\"/>",
                cfg.endpoint_size,
                theme.line_color
            );
        }
    }

    for vertex in &legend.vertices {
        let (vx, vy, vw, vh) = canvas.rect(vertex.rect);
        if let Some(path) = &vertex.icon_path {
            let _ = write!(
                svg,
                "<image x=\"{vx:.2}\" y=\"{vy:.2}\" width=\"{vw:.2}\" height=\"{vh:.2}\" preserveAspectRatio=\"none\" href=\"{}\"/>",
                escape_xml(path)
            );
        } else {
            let fill = vertex.color.as_deref().unwrap_or(&theme.tiny_room_color);
            let _ = write!(
                svg,
                "<rect x=\"{vx:.2}\" y=\"{vy:.2}\" width=\"{vw:.2}\" height=\"{vh:.2}\" rx=\"{:.2}\" fill=\"{fill}\"/>",
                config.object.rounding_size
            );
        }
        svg.push_str(&text_svg(canvas, &vertex.label, theme));
    }
}

fn text_svg(canvas: &Canvas, label: &TextLayout, theme: &Theme) -> String {
    let (x, y) = canvas.point(label.anchor);
    let total_height = label.lines.len() as f32 * label.line_height;
    let start_y = y - total_height / 2.0 + label.size;
    let mut text = String::new();
    let _ = write!(
        text,
        "<text x=\"{x:.2}\" y=\"{start_y:.2}\" text-anchor=\"middle\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">",
        theme.font_family, label.size, theme.text_color
    );
    for (idx, line) in label.lines.iter().enumerate() {
        let dy = if idx == 0 { 0.0 } else { label.line_height };
        let _ = write!(text, "<tspan x=\"{x:.2}\" dy=\"{dy:.2}\">{}</tspan>", escape_xml(line));
    }
    text.push_str("</text>");
    text
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, render_cfg: &RenderConfig) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = "Inter".to_string();
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let scale = render_cfg.scale.max(0.01);
    let size = tree.size().to_int_size().scale_by(scale).ok_or_else(|| {
        anyhow::anyhow!("image size is zero after scaling by {scale}")
    })?;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap_mut,
    );
    pixmap.save_png(output)?;
    Ok(())
}

#[cfg(not(feature = "png"))]
pub fn write_output_png(_svg: &str, _output: &Path, _render_cfg: &RenderConfig) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the `png` feature"))
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
