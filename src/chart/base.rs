//! Base constants and utility functions for the chart module.

use egui::Color32;

// Chart colors
pub const WHITE_COLOR: Color32 = Color32::from_rgb(255, 255, 255);
pub const GREY_COLOR: Color32 = Color32::from_rgb(100, 100, 100);
pub const BACKGROUND_COLOR: Color32 = Color32::from_rgb(20, 20, 20);
pub const GRID_COLOR: Color32 = Color32::from_rgb(45, 45, 45);

// Price line
pub const LINE_COLOR: Color32 = Color32::from_rgb(255, 99, 132);

// Cursor color
pub const CURSOR_COLOR: Color32 = Color32::from_rgb(255, 245, 162);

// Chart dimensions
pub const PEN_WIDTH: f32 = 1.5;
pub const POINT_RADIUS: f32 = 2.5;

// Layout constants
pub const MARGIN: f32 = 5.0;
pub const LEGEND_HEIGHT: f32 = 20.0;
pub const AXIS_X_HEIGHT: f32 = 36.0;
pub const AXIS_Y_WIDTH: f32 = 80.0;

/// Format price with appropriate precision
pub fn format_price(price: f64, decimals: usize) -> String {
    format!("{:.prec$}", price, prec = decimals)
}

/// Calculate nice axis tick values
pub fn calculate_axis_ticks(min_val: f64, max_val: f64, max_ticks: usize) -> Vec<f64> {
    if min_val >= max_val || max_ticks == 0 {
        return vec![min_val];
    }

    let range = max_val - min_val;
    let rough_step = range / max_ticks as f64;

    // Find the magnitude of the step
    let magnitude = 10.0_f64.powf(rough_step.log10().floor());
    let residual = rough_step / magnitude;

    // Choose a nice step value
    let nice_step = if residual <= 1.5 {
        magnitude
    } else if residual <= 3.0 {
        2.0 * magnitude
    } else if residual <= 7.0 {
        5.0 * magnitude
    } else {
        10.0 * magnitude
    };

    let mut ticks = Vec::new();
    let mut value = (min_val / nice_step).ceil() * nice_step;
    while value <= max_val {
        ticks.push(value);
        value += nice_step;
    }

    ticks
}

/// Indices of the points used as horizontal ticks, spread evenly and always
/// including the first and the last point.
pub fn tick_indices(count: usize, max_ticks: usize) -> Vec<usize> {
    if count == 0 || max_ticks == 0 {
        return Vec::new();
    }
    if count <= max_ticks {
        return (0..count).collect();
    }
    if max_ticks == 1 {
        return vec![count - 1];
    }

    let step = (count - 1) as f64 / (max_ticks - 1) as f64;
    let mut indices: Vec<usize> = (0..max_ticks)
        .map(|i| (i as f64 * step).round() as usize)
        .collect();
    indices.dedup();
    indices
}

/// Price range with a small padding, never degenerate
pub fn padded_range(min_val: f64, max_val: f64) -> (f64, f64) {
    if min_val > max_val {
        return (0.0, 1.0);
    }
    if (max_val - min_val).abs() < f64::EPSILON {
        let pad = (min_val.abs() * 0.05).max(1.0);
        return (min_val - pad, max_val + pad);
    }
    let padding = (max_val - min_val) * 0.05;
    (min_val - padding, max_val + padding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(12.3456, 2), "12.35");
        assert_eq!(format_price(7.0, 0), "7");
    }

    #[test]
    fn test_calculate_axis_ticks() {
        let ticks = calculate_axis_ticks(0.0, 100.0, 5);
        assert!(!ticks.is_empty());
        for tick in &ticks {
            assert!(*tick >= 0.0 && *tick <= 100.0);
        }
        assert_eq!(calculate_axis_ticks(5.0, 5.0, 5), vec![5.0]);
    }

    #[test]
    fn test_tick_indices() {
        assert!(tick_indices(0, 5).is_empty());
        assert_eq!(tick_indices(3, 5), vec![0, 1, 2]);

        let indices = tick_indices(101, 5);
        assert_eq!(indices, vec![0, 25, 50, 75, 100]);
        assert_eq!(tick_indices(10, 1), vec![9]);
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range(0.0, 100.0), (-5.0, 105.0));
        let (lo, hi) = padded_range(2.0, 2.0);
        assert!(lo < 2.0 && hi > 2.0);
    }
}
