//! Line chart of a single price series, drawn with egui.

use std::collections::VecDeque;

use chrono::{DateTime, Local, Utc};
use egui::{Color32, Pos2, Rect, Response, Sense, Stroke, StrokeKind, Ui, Vec2};

use super::base::{
    calculate_axis_ticks, format_price, padded_range, tick_indices, AXIS_X_HEIGHT, AXIS_Y_WIDTH,
    BACKGROUND_COLOR, CURSOR_COLOR, GREY_COLOR, GRID_COLOR, LEGEND_HEIGHT, LINE_COLOR, MARGIN,
    PEN_WIDTH, POINT_RADIUS, WHITE_COLOR,
};
use crate::tracker::{AxisMode, ChartBackend, ChartConfig, PriceChart, PricePoint};

/// Live line chart mirroring the controller's series window
pub struct LineChart {
    config: ChartConfig,
    points: VecDeque<PricePoint>,
    /// Category labels, kept in step with `points`
    labels: VecDeque<String>,
    revision: u64,
    destroyed: bool,
    price_decimals: usize,
}

impl LineChart {
    pub fn new(config: ChartConfig, points: &[PricePoint]) -> Self {
        let mut chart = Self {
            config,
            points: VecDeque::with_capacity(points.len()),
            labels: VecDeque::with_capacity(points.len()),
            revision: 0,
            destroyed: false,
            price_decimals: 2,
        };
        for point in points {
            chart.push_point(point);
        }
        chart
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Number of `update()` calls so far
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn set_price_decimals(&mut self, decimals: usize) {
        self.price_decimals = decimals;
    }

    /// Draw the chart into all available space
    pub fn show(&self, ui: &mut Ui) -> Response {
        let available_size = ui.available_size();
        let (response, painter) = ui.allocate_painter(available_size, Sense::hover());
        let rect = response.rect;

        painter.rect_filled(rect, 0.0, BACKGROUND_COLOR);

        let plot_rect = Rect::from_min_max(
            Pos2::new(rect.left() + MARGIN, rect.top() + MARGIN + LEGEND_HEIGHT),
            Pos2::new(rect.right() - MARGIN - AXIS_Y_WIDTH, rect.bottom() - MARGIN - AXIS_X_HEIGHT),
        );
        if plot_rect.width() <= 0.0 || plot_rect.height() <= 0.0 || self.destroyed {
            return response;
        }

        painter.rect_stroke(plot_rect, 0.0, Stroke::new(1.0, GREY_COLOR), StrokeKind::Inside);
        self.draw_legend(ui, rect);

        if self.points.is_empty() {
            painter.text(
                plot_rect.center(),
                egui::Align2::CENTER_CENTER,
                "No data",
                egui::FontId::proportional(20.0),
                GREY_COLOR,
            );
            return response;
        }

        let (min_price, max_price) = self.price_range();

        self.draw_y_axis(ui, plot_rect, min_price, max_price);
        self.draw_x_axis(ui, plot_rect);

        let line: Vec<Pos2> = (0..self.points.len())
            .map(|ix| self.screen_pos(plot_rect, ix, min_price, max_price))
            .collect();

        if line.len() > 1 {
            painter.add(egui::Shape::line(line.clone(), Stroke::new(PEN_WIDTH, LINE_COLOR)));
        }
        for pos in &line {
            painter.circle_filled(*pos, POINT_RADIUS, LINE_COLOR);
        }

        if let Some(hover_pos) = response.hover_pos() {
            if plot_rect.contains(hover_pos) {
                self.draw_cursor(ui, plot_rect, &line, hover_pos);
            }
        }

        response
    }

    fn price_range(&self) -> (f64, f64) {
        let (min, max) = self
            .points
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), p| (lo.min(p.price), hi.max(p.price)));
        padded_range(min, max)
    }

    /// Horizontal position of point `ix` as a fraction of the plot width
    fn x_fraction(&self, ix: usize) -> f32 {
        let count = self.points.len();
        match self.config.axis {
            AxisMode::Category => {
                if count <= 1 {
                    0.5
                } else {
                    ix as f32 / (count - 1) as f32
                }
            }
            AxisMode::Time => {
                let (Some(first), Some(last), Some(point)) =
                    (self.points.front(), self.points.back(), self.points.get(ix))
                else {
                    return 0.5;
                };
                let span = (last.timestamp - first.timestamp).num_milliseconds();
                if span <= 0 {
                    return 0.5;
                }
                let offset = (point.timestamp - first.timestamp).num_milliseconds();
                offset as f32 / span as f32
            }
        }
    }

    fn screen_pos(&self, plot_rect: Rect, ix: usize, min_price: f64, max_price: f64) -> Pos2 {
        let x = plot_rect.left() + self.x_fraction(ix) * plot_rect.width();
        let price = self.points.get(ix).map_or(min_price, |p| p.price);
        let normalized = (price - min_price) / (max_price - min_price);
        let y = plot_rect.bottom() - (normalized as f32 * plot_rect.height());
        Pos2::new(x, y)
    }

    fn tick_label(&self, ix: usize) -> String {
        match self.config.axis {
            AxisMode::Category => self.labels.get(ix).cloned().unwrap_or_default(),
            AxisMode::Time => self
                .points
                .get(ix)
                .map(|p| local_time(&p.timestamp, "%m-%d\n%H:%M:%S"))
                .unwrap_or_default(),
        }
    }

    fn draw_legend(&self, ui: &mut Ui, rect: Rect) {
        let painter = ui.painter();
        let swatch = Rect::from_min_size(
            Pos2::new(rect.left() + MARGIN + 4.0, rect.top() + MARGIN + 5.0),
            Vec2::new(24.0, 10.0),
        );
        painter.rect_filled(swatch, 0.0, LINE_COLOR);
        painter.text(
            Pos2::new(swatch.right() + 6.0, swatch.center().y),
            egui::Align2::LEFT_CENTER,
            &self.config.label,
            egui::FontId::proportional(12.0),
            WHITE_COLOR,
        );
    }

    /// Draw Y-axis with tick labels and grid lines
    fn draw_y_axis(&self, ui: &mut Ui, plot_rect: Rect, min_val: f64, max_val: f64) {
        let painter = ui.painter();
        let axis_left = plot_rect.right();

        for tick in calculate_axis_ticks(min_val, max_val, 5) {
            let normalized = (tick - min_val) / (max_val - min_val);
            let y = plot_rect.bottom() - (normalized as f32 * plot_rect.height());

            painter.line_segment(
                [Pos2::new(plot_rect.left(), y), Pos2::new(plot_rect.right(), y)],
                Stroke::new(1.0, GRID_COLOR),
            );
            painter.line_segment(
                [Pos2::new(axis_left, y), Pos2::new(axis_left + 4.0, y)],
                Stroke::new(1.0, GREY_COLOR),
            );
            painter.text(
                Pos2::new(axis_left + 6.0, y),
                egui::Align2::LEFT_CENTER,
                format_price(tick, self.price_decimals),
                egui::FontId::proportional(11.0),
                WHITE_COLOR,
            );
        }

        if let Some((_, y_title)) = self.config.axis.titles() {
            painter.text(
                Pos2::new(axis_left + AXIS_Y_WIDTH * 0.5, plot_rect.top() - 4.0),
                egui::Align2::CENTER_BOTTOM,
                y_title,
                egui::FontId::proportional(12.0),
                GREY_COLOR,
            );
        }
    }

    /// Draw X-axis with ticks taken from the data
    fn draw_x_axis(&self, ui: &mut Ui, plot_rect: Rect) {
        let painter = ui.painter();
        let max_ticks = ((plot_rect.width() / 120.0) as usize).max(2);
        let y = plot_rect.bottom();

        for ix in tick_indices(self.points.len(), max_ticks) {
            let x = plot_rect.left() + self.x_fraction(ix) * plot_rect.width();

            painter.line_segment([Pos2::new(x, y), Pos2::new(x, y + 4.0)], Stroke::new(1.0, GREY_COLOR));
            painter.text(
                Pos2::new(x, y + 6.0),
                egui::Align2::CENTER_TOP,
                self.tick_label(ix),
                egui::FontId::proportional(10.0),
                WHITE_COLOR,
            );
        }

        if let Some((x_title, _)) = self.config.axis.titles() {
            painter.text(
                Pos2::new(plot_rect.right(), plot_rect.bottom() + AXIS_X_HEIGHT),
                egui::Align2::RIGHT_BOTTOM,
                x_title,
                egui::FontId::proportional(12.0),
                GREY_COLOR,
            );
        }
    }

    /// Crosshair snapped to the nearest point
    fn draw_cursor(&self, ui: &mut Ui, plot_rect: Rect, line: &[Pos2], hover_pos: Pos2) {
        let Some((ix, pos)) = line
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.x - hover_pos.x).abs().total_cmp(&(b.x - hover_pos.x).abs()))
        else {
            return;
        };
        let Some(point) = self.points.get(ix) else {
            return;
        };

        let painter = ui.painter();
        let stroke = Stroke::new(1.0, Color32::from_rgba_unmultiplied(255, 255, 255, 128));
        painter.line_segment([Pos2::new(pos.x, plot_rect.top()), Pos2::new(pos.x, plot_rect.bottom())], stroke);
        painter.line_segment([Pos2::new(plot_rect.left(), pos.y), Pos2::new(plot_rect.right(), pos.y)], stroke);
        painter.circle_stroke(*pos, POINT_RADIUS + 2.0, Stroke::new(1.0, CURSOR_COLOR));

        let label = format_price(point.price, self.price_decimals);
        let label_pos = Pos2::new(plot_rect.right() + 4.0, pos.y);
        let text_size =
            ui.fonts_mut(|f| f.glyph_width(&egui::FontId::proportional(11.0), ' ')) * label.len() as f32;
        let label_rect = Rect::from_min_size(
            Pos2::new(label_pos.x, label_pos.y - 8.0),
            Vec2::new(text_size + 8.0, 16.0),
        );
        painter.rect_filled(label_rect, 2.0, CURSOR_COLOR);
        painter.text(
            label_pos,
            egui::Align2::LEFT_CENTER,
            label,
            egui::FontId::proportional(11.0),
            Color32::BLACK,
        );

        let time_label = local_time(&point.timestamp, "%Y-%m-%d %H:%M:%S");
        painter.text(
            Pos2::new(pos.x, plot_rect.top() + 4.0),
            egui::Align2::CENTER_TOP,
            time_label,
            egui::FontId::proportional(10.0),
            CURSOR_COLOR,
        );
    }
}

fn local_time(timestamp: &DateTime<Utc>, format: &str) -> String {
    timestamp.with_timezone(&Local).format(format).to_string()
}

impl PriceChart for LineChart {
    fn push_point(&mut self, point: &PricePoint) {
        self.labels.push_back(self.config.axis.format_label(&point.timestamp));
        self.points.push_back(*point);
    }

    fn shift_point(&mut self) {
        self.points.pop_front();
        self.labels.pop_front();
    }

    fn update(&mut self) {
        self.revision += 1;
    }

    fn destroy(&mut self) {
        self.points.clear();
        self.labels.clear();
        self.destroyed = true;
    }
}

/// Backend creating [`LineChart`]s for the central panel
#[derive(Debug, Default)]
pub struct EguiChartBackend {
    created: u64,
}

impl EguiChartBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charts created so far
    pub fn created(&self) -> u64 {
        self.created
    }
}

impl ChartBackend for EguiChartBackend {
    type Chart = LineChart;

    fn create_chart(&mut self, config: ChartConfig, points: &[PricePoint]) -> LineChart {
        self.created += 1;
        LineChart::new(config, points)
    }
}
