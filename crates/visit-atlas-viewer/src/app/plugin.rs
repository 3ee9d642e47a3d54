//! Walkers plugin that draws the region layers and captures pointer input
//!
//! Region polygons are triangulated once when a source is added. Each frame the
//! engine hands the plugin a snapshot of its layers (paint rules and hovered
//! features); the plugin paints the visible regions and writes what the pointer did
//! into a shared [`PointerFeedback`] that the engine turns into map events.

use egui::{Color32, Stroke};
use geo::{Coord, Rect, TriangulateEarcut};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use visit_atlas_lib::engine::{FeatureId, FeatureState};
use visit_atlas_lib::style::{Color, FillColorRule, OpacityRule};
use visit_atlas_lib::{Coordinate, RegionCatalog, RegionFeature};
use walkers::{Plugin, Projector};

/// Largest latitude the web mercator projection can show
const MAX_MERCATOR_LATITUDE: f64 = 85.0511;

const MARKER_RADIUS: f32 = 7.0;

/// Triangulated polygons of one region, in lon/lat degrees
pub struct RegionShape {
    pub feature: RegionFeature,
    bounds: Option<Rect<f64>>,
    vertices: Vec<[f64; 2]>,
    triangles: Vec<[u32; 3]>,
    rings: Vec<Vec<[f64; 2]>>,
}

impl RegionShape {
    fn is_visible(&self, view: &Rect<f64>) -> bool {
        self.bounds.is_some_and(|b| overlaps(&b, view))
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }
}

/// A loaded GeoJSON source: the catalog for hit-testing plus render geometry
pub struct RegionSource {
    catalog: RegionCatalog,
    shapes: Vec<RegionShape>,
}

impl RegionSource {
    pub fn new(catalog: RegionCatalog) -> Self {
        profiling::scope!("RegionSource::new");

        let shapes = catalog
            .iter()
            .map(|region| {
                let mut vertices = Vec::new();
                let mut triangles = Vec::new();
                let mut rings = Vec::new();
                for polygon in &region.shape {
                    let raw = polygon.earcut_triangles_raw();
                    let base = vertices.len() as u32;
                    vertices.extend(raw.vertices.chunks_exact(2).map(|xy| [xy[0], xy[1]]));
                    triangles.extend(raw.triangle_indices.chunks_exact(3).map(|t| {
                        [base + t[0] as u32, base + t[1] as u32, base + t[2] as u32]
                    }));
                    rings.push(polygon.exterior().coords().map(|c| [c.x, c.y]).collect());
                    for interior in polygon.interiors() {
                        rings.push(interior.coords().map(|c| [c.x, c.y]).collect());
                    }
                }
                RegionShape {
                    feature: region.feature.clone(),
                    bounds: region.bounds(),
                    vertices,
                    triangles,
                    rings,
                }
            })
            .collect();

        Self { catalog, shapes }
    }

    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    pub fn shapes(&self) -> &[RegionShape] {
        &self.shapes
    }
}

/// What the pointer did during the last rendered frame
#[derive(Debug, Default, Clone)]
pub struct PointerFeedback {
    /// Frames rendered so far
    pub frame: u64,
    pub hover: Option<Coordinate>,
    pub touching: bool,
    /// Click position, consumed by the engine
    pub clicked: Option<Coordinate>,
    /// Screen position of the open popup's anchor
    pub popup_pos: Option<egui::Pos2>,
}

/// Paint snapshot of one layer
pub enum LayerPaint {
    Fill {
        source: Arc<RegionSource>,
        color: FillColorRule,
        opacity: OpacityRule,
        hovered: BTreeSet<FeatureId>,
    },
    Line {
        source: Arc<RegionSource>,
        color: Color,
        width: f32,
    },
}

/// Plugin for rendering region layers on the map
pub struct RegionPlugin {
    layers: Vec<LayerPaint>,
    markers: Vec<(Coordinate, Color)>,
    popup_anchor: Option<Coordinate>,
    feedback: Arc<RwLock<PointerFeedback>>,
}

impl RegionPlugin {
    pub fn new(
        layers: Vec<LayerPaint>,
        markers: Vec<(Coordinate, Color)>,
        feedback: Arc<RwLock<PointerFeedback>>,
    ) -> Self {
        Self {
            layers,
            markers,
            popup_anchor: None,
            feedback,
        }
    }

    pub fn with_popup_anchor(mut self, anchor: Option<Coordinate>) -> Self {
        self.popup_anchor = anchor;
        self
    }

    fn paint_fill(
        painter: &egui::Painter,
        projector: &Projector,
        view: &Rect<f64>,
        source: &RegionSource,
        color: &FillColorRule,
        opacity: &OpacityRule,
        hovered: &BTreeSet<FeatureId>,
    ) {
        profiling::scope!("paint_fill");

        let mut mesh = egui::Mesh::default();
        for shape in source.shapes() {
            if !shape.is_visible(view) {
                continue;
            }
            let state = FeatureState {
                hover: hovered.contains(&shape.feature.feature_id),
            };
            let fill = color
                .evaluate(state, &shape.feature.region_id)
                .with_opacity(opacity.evaluate(state));
            if fill.a == 0 {
                continue;
            }
            let fill = to_color32(fill);

            let base = mesh.vertices.len() as u32;
            for [lon, lat] in &shape.vertices {
                mesh.colored_vertex(project(projector, *lon, *lat), fill);
            }
            for [a, b, c] in &shape.triangles {
                mesh.add_triangle(base + a, base + b, base + c);
            }
        }

        if !mesh.is_empty() {
            painter.add(egui::Shape::mesh(mesh));
        }
    }

    fn paint_outline(
        painter: &egui::Painter,
        projector: &Projector,
        view: &Rect<f64>,
        source: &RegionSource,
        color: Color,
        width: f32,
    ) {
        profiling::scope!("paint_outline");

        let stroke = Stroke::new(width, to_color32(color));
        for shape in source.shapes().iter().filter(|s| s.is_visible(view)) {
            for ring in &shape.rings {
                let points: Vec<egui::Pos2> = ring
                    .iter()
                    .map(|[lon, lat]| project(projector, *lon, *lat))
                    .collect();
                if points.len() >= 2 {
                    painter.add(egui::Shape::line(points, stroke));
                }
            }
        }
    }
}

impl Plugin for RegionPlugin {
    fn run(
        self: Box<Self>,
        ui: &mut egui::Ui,
        response: &egui::Response,
        projector: &Projector,
        _map_memory: &walkers::MapMemory,
    ) {
        profiling::scope!("RegionPlugin::run");

        let painter = ui.painter();
        let view = visible_bounds(response.rect, projector);

        for layer in &self.layers {
            match layer {
                LayerPaint::Fill {
                    source,
                    color,
                    opacity,
                    hovered,
                } => Self::paint_fill(painter, projector, &view, source, color, opacity, hovered),
                LayerPaint::Line {
                    source,
                    color,
                    width,
                } => Self::paint_outline(painter, projector, &view, source, *color, *width),
            }
        }

        for (at, color) in &self.markers {
            let center = project(projector, at.longitude(), at.latitude());
            painter.circle_filled(center, MARKER_RADIUS, to_color32(*color));
            painter.circle_stroke(center, MARKER_RADIUS, Stroke::new(2.0, Color32::WHITE));
        }

        let hover = response
            .hover_pos()
            .and_then(|pos| unproject(projector, pos));
        let clicked = if response.clicked() {
            response
                .interact_pointer_pos()
                .and_then(|pos| unproject(projector, pos))
        } else {
            None
        };
        let touching = ui.input(|i| i.any_touches());
        let popup_pos = self
            .popup_anchor
            .map(|at| project(projector, at.longitude(), at.latitude()));

        // Use try_write: the engine only reads between frames
        if let Ok(mut feedback) = self.feedback.try_write() {
            feedback.frame += 1;
            feedback.hover = hover;
            feedback.touching = touching;
            feedback.popup_pos = popup_pos;
            if clicked.is_some() {
                feedback.clicked = clicked;
            }
        }
    }
}

pub fn to_color32(color: Color) -> Color32 {
    Color32::from_rgba_unmultiplied(color.r, color.g, color.b, color.a)
}

fn project(projector: &Projector, lon: f64, lat: f64) -> egui::Pos2 {
    projector.project(walkers::lat_lon(lat, lon)).to_pos2()
}

fn unproject(projector: &Projector, pos: egui::Pos2) -> Option<Coordinate> {
    let position = projector.unproject(pos.to_vec2());
    normalize(position.x(), position.y())
}

/// Wrap longitude into [-180, 180] and clamp latitude to the mercator range
pub fn normalize(lon: f64, lat: f64) -> Option<Coordinate> {
    if !lon.is_finite() || !lat.is_finite() {
        return None;
    }
    let lon = (lon + 180.0).rem_euclid(360.0) - 180.0;
    let lat = lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    Coordinate::new(lon, lat).ok()
}

fn visible_bounds(rect: egui::Rect, projector: &Projector) -> Rect<f64> {
    let top_left = projector.unproject(rect.min.to_vec2());
    let bottom_right = projector.unproject(rect.max.to_vec2());
    Rect::new(
        Coord {
            x: top_left.x(),
            y: top_left.y(),
        },
        Coord {
            x: bottom_right.x(),
            y: bottom_right.y(),
        },
    )
}

fn overlaps(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x
        && a.max().x >= b.min().x
        && a.min().y <= b.max().y
        && a.max().y >= b.min().y
}
