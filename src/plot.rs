//! Zone map rendering.
//!
//! Each distinct roughness value becomes a zone coloured from a fixed 20 colour palette. The map
//! is drawn on an equal-degree lat/long frame with dashed gridlines, tick labels and a legend
//! (`Zone 0`, `Zone 1`, ...) in the lower right corner.
use crate::config::PlotSettings;
use crate::manning::ManningField;
use crate::zones::zone_index_grid;
use anyhow::{Context, Result, ensure};
use image::{Rgb, RgbImage};
use log::{debug, info};
use std::path::Path;

/// Qualitative palette, repeated when there are more than 20 zones
pub const PALETTE: [Rgb<u8>; 20] = [
    Rgb([31, 119, 180]),
    Rgb([174, 199, 232]),
    Rgb([255, 127, 14]),
    Rgb([255, 187, 120]),
    Rgb([44, 160, 44]),
    Rgb([152, 223, 138]),
    Rgb([214, 39, 40]),
    Rgb([255, 152, 150]),
    Rgb([148, 103, 189]),
    Rgb([197, 176, 213]),
    Rgb([140, 86, 75]),
    Rgb([196, 156, 148]),
    Rgb([227, 119, 194]),
    Rgb([247, 182, 210]),
    Rgb([127, 127, 127]),
    Rgb([199, 199, 199]),
    Rgb([188, 189, 34]),
    Rgb([219, 219, 141]),
    Rgb([23, 190, 207]),
    Rgb([158, 218, 229]),
];

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID_GREY: Rgb<u8> = Rgb([128, 128, 128]);
const MAP_BACKGROUND: Rgb<u8> = Rgb([236, 243, 250]);

/// Fraction of the figure left free around the map (left, right, top, bottom)
const MARGINS: (f64, f64, f64, f64) = (0.12, 0.05, 0.05, 0.10);

/// Padding kept around the content when cropping, in inches
const CROP_PAD_INCHES: f64 = 0.1;

pub fn zone_color(zone: usize) -> Rgb<u8> {
    PALETTE[zone % PALETTE.len()]
}

// 5x7 glyphs, one byte per row with the low five bits used
fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
        'n' => [0x00, 0x00, 0x16, 0x19, 0x11, 0x11, 0x11],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        's' => [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E],
        _ => [0; 7],
    }
}

struct Canvas {
    img: RgbImage,
    /// Pixels per glyph dot
    text_scale: u32,
}

impl Canvas {
    fn put(&mut self, x: i64, y: i64, colour: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.img.width() && (y as u32) < self.img.height() {
            self.img.put_pixel(x as u32, y as u32, colour);
        }
    }

    fn blend(&mut self, x: i64, y: i64, colour: Rgb<u8>, alpha: f64) {
        if x < 0 || y < 0 || x as u32 >= self.img.width() || y as u32 >= self.img.height() {
            return;
        }
        let px = self.img.get_pixel_mut(x as u32, y as u32);
        for (dst, src) in px.0.iter_mut().zip(colour.0) {
            *dst = (f64::from(*dst) * (1.0 - alpha) + f64::from(src) * alpha).round() as u8;
        }
    }

    fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, colour: Rgb<u8>) {
        for yy in y..y + h {
            for xx in x..x + w {
                self.put(xx, yy, colour);
            }
        }
    }

    fn blend_rect(&mut self, x: i64, y: i64, w: i64, h: i64, colour: Rgb<u8>, alpha: f64) {
        for yy in y..y + h {
            for xx in x..x + w {
                self.blend(xx, yy, colour, alpha);
            }
        }
    }

    fn outline_rect(&mut self, x: i64, y: i64, w: i64, h: i64, thickness: i64, colour: Rgb<u8>) {
        self.fill_rect(x, y, w, thickness, colour);
        self.fill_rect(x, y + h - thickness, w, thickness, colour);
        self.fill_rect(x, y, thickness, h, colour);
        self.fill_rect(x + w - thickness, y, thickness, h, colour);
    }

    fn text_width(&self, text: &str) -> i64 {
        (text.chars().count() as i64 * 6 - 1).max(0) * i64::from(self.text_scale)
    }

    fn text_height(&self) -> i64 {
        7 * i64::from(self.text_scale)
    }

    fn draw_text(&mut self, x: i64, y: i64, text: &str, colour: Rgb<u8>) {
        let s = i64::from(self.text_scale);
        for (i, c) in text.chars().enumerate() {
            let origin = x + i as i64 * 6 * s;
            for (row, bits) in glyph(c).iter().enumerate() {
                for col in 0..5 {
                    if bits & (0x10 >> col) != 0 {
                        self.fill_rect(origin + col * s, y + row as i64 * s, s, s, colour);
                    }
                }
            }
        }
    }
}

/// Placement of the lat/long frame inside the figure
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MapFrame {
    pub x0: f64,
    pub y0: f64,
    /// Pixels per degree, equal on both axes
    pub ppd: f64,
    pub lon_range: (f64, f64),
    pub lat_range: (f64, f64),
}

impl MapFrame {
    fn new(width: u32, height: u32, lon_range: (f64, f64), lat_range: (f64, f64)) -> Self {
        let (left, right, top, bottom) = MARGINS;
        let avail_w = f64::from(width) * (1.0 - left - right);
        let avail_h = f64::from(height) * (1.0 - top - bottom);
        let ppd =
            (avail_w / (lon_range.1 - lon_range.0)).min(avail_h / (lat_range.1 - lat_range.0));

        MapFrame {
            x0: f64::from(width) * left,
            y0: f64::from(height) * top,
            ppd,
            lon_range,
            lat_range,
        }
    }

    fn width(&self) -> f64 {
        (self.lon_range.1 - self.lon_range.0) * self.ppd
    }

    fn height(&self) -> f64 {
        (self.lat_range.1 - self.lat_range.0) * self.ppd
    }

    pub fn to_pixel(&self, lon: f64, lat: f64) -> (i64, i64) {
        (
            (self.x0 + (lon - self.lon_range.0) * self.ppd).floor() as i64,
            (self.y0 + (self.lat_range.1 - lat) * self.ppd).floor() as i64,
        )
    }

    fn to_lon_lat(&self, px: i64, py: i64) -> (f64, f64) {
        (
            self.lon_range.0 + (px as f64 + 0.5 - self.x0) / self.ppd,
            self.lat_range.1 - (py as f64 + 0.5 - self.y0) / self.ppd,
        )
    }
}

/// Index of the regular-grid cell containing `v`, if any
fn cell_index(axis: &[f64], v: f64) -> Option<usize> {
    let first = *axis.first()?;
    let step = match axis.len() {
        1 => 1.0,
        n => (axis[n - 1] - first) / (n - 1) as f64,
    };
    if step == 0.0 {
        return None;
    }
    let idx = ((v - first) / step).round();
    if idx < 0.0 || idx >= axis.len() as f64 {
        return None;
    }
    let idx = idx as usize;
    ((v - axis[idx]).abs() <= step.abs() / 2.0).then_some(idx)
}

/// Range covered by grid cells along an axis
fn axis_bounds(axis: &[f64]) -> (f64, f64) {
    let min = axis.iter().copied().fold(f64::INFINITY, f64::min);
    let max = axis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let half = if axis.len() > 1 {
        (max - min) / (axis.len() - 1) as f64 / 2.0
    } else {
        0.5
    };
    (min - half, max + half)
}

fn overlaps(a: (f64, f64), b: (f64, f64)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// The configured extent, or the grid's own extent when the two don't overlap
fn map_extent(field: &ManningField, settings: &PlotSettings) -> ((f64, f64), (f64, f64)) {
    let lon = axis_bounds(&field.x_coords());
    let lat = axis_bounds(&field.y_coords());
    if overlaps(lon, settings.lon_range) && overlaps(lat, settings.lat_range) {
        (settings.lon_range, settings.lat_range)
    } else {
        debug!("Field lies outside the configured map extent; using the field extent");
        (lon, lat)
    }
}

fn ticks(spec: (f64, f64, f64), range: (f64, f64)) -> Vec<f64> {
    let (start, stop, step) = spec;
    if step <= 0.0 {
        return Vec::new();
    }
    (0..)
        .map(|i: i32| start + f64::from(i) * step)
        .take_while(|v| *v < stop)
        .filter(|v| *v >= range.0 && *v <= range.1)
        .collect()
}

fn tick_label(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{:.1}", v)
    }
}

/// Draw the zone map of the first time step of `field`
pub(crate) fn render_zones(
    field: &ManningField,
    settings: &PlotSettings,
) -> Result<(RgbImage, MapFrame)> {
    ensure!(settings.dpi > 0, "Plot dpi must be positive");
    let width = (settings.figure_size.0 * f64::from(settings.dpi)).round() as u32;
    let height = (settings.figure_size.1 * f64::from(settings.dpi)).round() as u32;
    ensure!(width > 0 && height > 0, "Plot figure size must be positive");

    let (zone_of_cell, n_zones) = zone_index_grid(field.first_step());
    let xs = field.x_coords();
    let ys = field.y_coords();
    let nx = field.nx();

    let (lon_range, lat_range) = map_extent(field, settings);
    let frame = MapFrame::new(width, height, lon_range, lat_range);
    let mut canvas = Canvas {
        img: RgbImage::from_pixel(width, height, WHITE),
        text_scale: (settings.dpi / 50).max(1),
    };

    let (mx, my) = (frame.x0.round() as i64, frame.y0.round() as i64);
    let (mw, mh) = (frame.width().round() as i64, frame.height().round() as i64);

    for py in my..my + mh {
        for px in mx..mx + mw {
            let (lon, lat) = frame.to_lon_lat(px, py);
            let colour = match (cell_index(&xs, lon), cell_index(&ys, lat)) {
                (Some(ix), Some(iy)) => zone_color(zone_of_cell[iy * nx + ix]),
                _ => MAP_BACKGROUND,
            };
            canvas.put(px, py, colour);
        }
    }

    // Dashed gridlines and their labels
    let scale = i64::from(canvas.text_scale);
    let line = scale.max(1);
    let (dash, gap) = (4 * scale, 3 * scale);
    for lon in ticks(settings.lon_ticks, lon_range) {
        let (x, _) = frame.to_pixel(lon, lat_range.1);
        for y in (my..my + mh).filter(|y| (y - my) % (dash + gap) < dash) {
            canvas.blend_rect(x, y, line, 1, GRID_GREY, 0.5);
        }
        let label = tick_label(lon);
        let tx = x - canvas.text_width(&label) / 2;
        canvas.draw_text(tx, my + mh + 3 * scale, &label, BLACK);
    }
    for lat in ticks(settings.lat_ticks, lat_range) {
        let (_, y) = frame.to_pixel(lon_range.0, lat);
        for x in (mx..mx + mw).filter(|x| (x - mx) % (dash + gap) < dash) {
            canvas.blend_rect(x, y, 1, line, GRID_GREY, 0.5);
        }
        let label = tick_label(lat);
        let tx = mx - canvas.text_width(&label) - 3 * scale;
        canvas.draw_text(tx, y - canvas.text_height() / 2, &label, BLACK);
    }

    canvas.outline_rect(mx, my, mw, mh, line, BLACK);
    draw_legend(&mut canvas, n_zones, (mx, my, mw, mh));

    Ok((canvas.img, frame))
}

// Two-column legend anchored to the lower right of the map
fn draw_legend(canvas: &mut Canvas, n_zones: usize, map: (i64, i64, i64, i64)) {
    if n_zones == 0 {
        return;
    }
    let (mx, my, mw, mh) = map;
    let s = i64::from(canvas.text_scale);
    let row_h = canvas.text_height() + 3 * s;
    let patch_w = 10 * s;
    let label_w = canvas.text_width(&format!("Zone {}", n_zones - 1));
    let col_w = patch_w + 4 * s + label_w;
    let columns = if n_zones > 1 { 2 } else { 1 };
    let rows = n_zones.div_ceil(columns) as i64;
    let pad = 4 * s;

    let title = "Zones";
    let entries_w = columns as i64 * col_w + (columns as i64 - 1) * 6 * s;
    let box_w = entries_w.max(canvas.text_width(title)) + 2 * pad;
    let box_h = row_h * (rows + 1) + 2 * pad;
    let bx = mx + mw - box_w - 4 * s;
    let by = my + mh - box_h - 4 * s;

    canvas.blend_rect(bx, by, box_w, box_h, WHITE, 0.8);
    canvas.outline_rect(bx, by, box_w, box_h, s.max(1), BLACK);
    canvas.draw_text(bx + (box_w - canvas.text_width(title)) / 2, by + pad, title, BLACK);

    for zone in 0..n_zones {
        let col = (zone / rows as usize) as i64;
        let row = (zone as i64) % rows;
        let x = bx + pad + col * (col_w + 6 * s);
        let y = by + pad + row_h * (row + 1);
        canvas.fill_rect(x, y, patch_w, canvas.text_height(), zone_color(zone));
        canvas.draw_text(x + patch_w + 4 * s, y, &format!("Zone {}", zone), BLACK);
    }
}

/// Crop to the non-white content plus a small border
fn crop_tight(img: &RgbImage, pad: u32) -> RgbImage {
    let (mut x_min, mut y_min, mut x_max, mut y_max) = (u32::MAX, u32::MAX, 0, 0);
    for (x, y, px) in img.enumerate_pixels() {
        if *px != WHITE {
            x_min = x_min.min(x);
            y_min = y_min.min(y);
            x_max = x_max.max(x);
            y_max = y_max.max(y);
        }
    }
    if x_min > x_max {
        return img.clone();
    }

    let x0 = x_min.saturating_sub(pad);
    let y0 = y_min.saturating_sub(pad);
    let x1 = (x_max + pad).min(img.width() - 1);
    let y1 = (y_max + pad).min(img.height() - 1);
    image::imageops::crop_imm(img, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image()
}

/// Render the zone map and, if `savepath` is given, write it as an image
pub fn plot_zones(
    field: &ManningField,
    settings: &PlotSettings,
    savepath: Option<&Path>,
) -> Result<RgbImage> {
    let (img, _) = render_zones(field, settings)?;
    let pad = (CROP_PAD_INCHES * f64::from(settings.dpi)).round() as u32;
    let img = crop_tight(&img, pad);

    if let Some(path) = savepath {
        img.save(path)
            .with_context(|| format!("Failed to save zone plot: {:?}", path))?;
        info!("Saved zone plot to {:?}", path);
    }

    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manning::tests::grid;
    use tempfile::tempdir;

    fn north_sea_field() -> ManningField {
        grid(vec![1.0, 2.0, 3.0, 1.0], 2, 2)
            .with_coordinate("y", vec![55.5, 54.5])
            .with_coordinate("x", vec![0.5, 1.5])
    }

    fn small_settings() -> PlotSettings {
        PlotSettings {
            dpi: 20,
            ..PlotSettings::default()
        }
    }

    #[test]
    fn test_cell_index() {
        let axis = [0.5, 1.5, 2.5];
        assert_eq!(cell_index(&axis, 0.1), Some(0));
        assert_eq!(cell_index(&axis, 1.9), Some(1));
        assert_eq!(cell_index(&axis, 2.99), Some(2));
        assert_eq!(cell_index(&axis, 3.1), None);
        assert_eq!(cell_index(&axis, -0.1), None);

        let descending = [55.5, 54.5];
        assert_eq!(cell_index(&descending, 55.9), Some(0));
        assert_eq!(cell_index(&descending, 54.2), Some(1));
    }

    #[test]
    fn test_ticks() {
        assert_eq!(
            ticks((-2.0, 10.0, 2.0), (-3.0, 9.2)),
            vec![-2.0, 0.0, 2.0, 4.0, 6.0, 8.0]
        );
        assert_eq!(ticks((50.0, 57.0, 1.0), (49.2, 56.3)).len(), 7);
        assert!(ticks((0.0, 1.0, 0.0), (0.0, 1.0)).is_empty());
    }

    #[test]
    fn test_render_colours_cells_by_zone() {
        let field = north_sea_field();
        let (img, frame) = render_zones(&field, &small_settings()).unwrap();
        assert_eq!((img.width(), img.height()), (220, 170));

        let at = |lon, lat| {
            let (x, y) = frame.to_pixel(lon, lat);
            *img.get_pixel(x as u32, y as u32)
        };
        assert_eq!(at(0.5, 55.5), zone_color(0));
        assert_eq!(at(1.5, 55.5), zone_color(1));
        assert_eq!(at(0.5, 54.5), zone_color(2));
        assert_eq!(at(1.5, 54.5), zone_color(0));
        assert_eq!(at(5.5, 52.5), MAP_BACKGROUND);
    }

    #[test]
    fn test_render_falls_back_to_field_extent() {
        // No coordinates: cells sit at their indices, far from the configured extent
        let field = grid(vec![1.0, 2.0], 1, 2);
        let (_, frame) = render_zones(&field, &small_settings()).unwrap();
        assert_eq!(frame.lon_range, (-0.5, 1.5));
        assert_eq!(frame.lat_range, (-0.5, 0.5));
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(zone_color(0), zone_color(20));
        assert_ne!(zone_color(0), zone_color(1));
    }

    #[test]
    fn test_plot_zones_saves_cropped_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zones.png");
        let settings = small_settings();

        let img = plot_zones(&north_sea_field(), &settings, Some(&path)).unwrap();
        assert!(img.width() <= 220 && img.height() <= 170);

        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), img.dimensions());
    }

    #[test]
    fn test_plot_zones_without_path_writes_nothing() {
        let dir = tempdir().unwrap();
        plot_zones(&north_sea_field(), &small_settings(), None).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
