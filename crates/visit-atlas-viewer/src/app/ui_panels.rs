//! UI panels for the application
//!
//! Map overlays (sidebar toggle, locate button, toast, attribution), the visited
//! places sidebar, the visit popup and the location error window.

use crate::app::engine::WalkersEngine;
use crate::app::state::AppState;
use egui::{Color32, RichText, Ui};
use visit_atlas_lib::{AtlasStore, LocationErrorKind, MapEvent, MapPhase, PermissionNotice, Severity};

const OVERLAY_BUTTON_SIZE: egui::Vec2 = egui::vec2(40.0, 40.0);
const OVERLAY_MARGIN: f32 = 10.0;

/// Draw a square overlay button at `rect`, returns whether it was clicked
fn overlay_button(ui: &mut Ui, rect: egui::Rect, icon: &str, tooltip: &str) -> bool {
    let response = ui
        .allocate_rect(rect, egui::Sense::click())
        .on_hover_text(tooltip);

    let bg_color = if response.hovered() {
        ui.visuals().widgets.hovered.bg_fill
    } else {
        ui.visuals().widgets.inactive.bg_fill
    };
    ui.painter().rect_filled(rect, 5.0, bg_color);
    ui.painter().text(
        rect.center(),
        egui::Align2::CENTER_CENTER,
        icon,
        egui::FontId::proportional(20.0),
        ui.visuals().text_color(),
    );

    response.clicked()
}

/// Render the sidebar toggle button (overlaid on top-right of map)
pub fn sidebar_toggle_button(ui: &mut Ui, state: &mut AppState) {
    let rect = ui.max_rect();
    let button_pos =
        rect.right_top() + egui::vec2(-OVERLAY_BUTTON_SIZE.x - OVERLAY_MARGIN, OVERLAY_MARGIN);
    let button_rect = egui::Rect::from_min_size(button_pos, OVERLAY_BUTTON_SIZE);

    let icon = if state.sidebar_open { "✕" } else { "☰" };
    if overlay_button(ui, button_rect, icon, "Visited countries") {
        state.sidebar_open = !state.sidebar_open;
    }
}

/// Render the locate button under the sidebar toggle.
///
/// Only shown once a location (real or fallback) is known. Returns whether it was
/// clicked.
pub fn locate_button(ui: &mut Ui, known_location: bool, failed: bool, retrying: bool) -> bool {
    if !known_location {
        return false;
    }

    let rect = ui.max_rect();
    let button_pos = rect.right_top()
        + egui::vec2(
            -OVERLAY_BUTTON_SIZE.x - OVERLAY_MARGIN,
            2.0 * OVERLAY_MARGIN + OVERLAY_BUTTON_SIZE.y,
        );
    let button_rect = egui::Rect::from_min_size(button_pos, OVERLAY_BUTTON_SIZE);

    let (icon, tooltip) = match (failed, retrying) {
        (_, true) => ("…", "Locating"),
        (true, false) => ("⟳", "Try to locate me again"),
        (false, false) => ("◎", "My location"),
    };
    overlay_button(ui, button_rect, icon, tooltip)
}

/// Render the sidebar from the side (landscape) or the bottom (portrait)
pub fn render_sidebar(ctx: &egui::Context, state: &mut AppState, phase: MapPhase) {
    if !state.sidebar_open {
        return;
    }

    let screen_size = ctx.viewport_rect().size();
    if screen_size.y > screen_size.x {
        egui::TopBottomPanel::bottom("main_sidebar")
            .default_height(240.0)
            .min_height(160.0)
            .max_height(ctx.viewport_rect().height() * 0.6)
            .resizable(true)
            .show(ctx, |ui| render_sidebar_content(ui, state, phase));
    } else {
        egui::SidePanel::right("main_sidebar")
            .default_width(280.0)
            .min_width(220.0)
            .max_width(420.0)
            .resizable(true)
            .show(ctx, |ui| render_sidebar_content(ui, state, phase));
    }
}

fn render_sidebar_content(ui: &mut Ui, state: &mut AppState, phase: MapPhase) {
    ui.horizontal(|ui| {
        ui.heading(format!("🌍 Visited ({})", state.visited_count()));
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            let clear = ui.add_enabled(state.visited_count() > 0, egui::Button::new("🗑 Clear"));
            if clear.on_hover_text("Forget all visited countries").clicked() {
                state.clear_visited();
            }
        });
    });

    match phase {
        MapPhase::Uninitialized | MapPhase::Initializing => {
            ui.label(RichText::new("Loading map…").weak());
        }
        MapPhase::Failed => {
            ui.label(RichText::new("The map could not be started").color(Color32::LIGHT_RED));
        }
        MapPhase::Destroyed => {
            ui.label(RichText::new("The map was closed").weak());
        }
        MapPhase::Ready => {}
    }

    ui.separator();

    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui| {
            if state.visited_count() == 0 {
                ui.label(
                    RichText::new("Click a country on the map to mark it as visited.").weak(),
                );
                return;
            }
            for place in state.visited_places() {
                ui.horizontal(|ui| {
                    ui.label(RichText::new(&place.country_code_iso).monospace().strong());
                    ui.label(&place.place_name);
                });
            }
        });
}

fn severity_color(severity: Severity) -> Color32 {
    match severity {
        Severity::Info => Color32::from_rgb(0x34, 0x98, 0xdb),
        Severity::Success => Color32::from_rgb(0x2e, 0xcc, 0x71),
        Severity::Warning => Color32::from_rgb(0xf3, 0x9c, 0x12),
        Severity::Error => Color32::from_rgb(0xe7, 0x4c, 0x3c),
    }
}

/// Show the current toast at the top of the map, fading in and out
pub fn show_toast(ui: &mut Ui, state: &AppState) {
    let Some(toast) = state.toast() else {
        return;
    };
    let alpha = toast.alpha();
    if alpha <= 0.0 {
        return;
    }

    let rect = ui.max_rect();
    let font = egui::FontId::proportional(15.0);
    let galley = ui.painter().layout_no_wrap(
        toast.message.clone(),
        font.clone(),
        Color32::WHITE,
    );
    let toast_size = galley.size() + egui::vec2(32.0, 20.0);
    let toast_pos = rect.center_top() + egui::vec2(-toast_size.x / 2.0, 2.0 * OVERLAY_MARGIN);
    let toast_rect = egui::Rect::from_min_size(toast_pos, toast_size);

    ui.painter().rect_filled(
        toast_rect,
        8.0,
        egui::Color32::from_black_alpha((200.0 * alpha) as u8),
    );
    ui.painter().rect_filled(
        egui::Rect::from_min_size(toast_rect.min, egui::vec2(6.0, toast_size.y)),
        egui::CornerRadius {
            nw: 8,
            sw: 8,
            ne: 0,
            se: 0,
        },
        severity_color(toast.severity).gamma_multiply(alpha),
    );
    ui.painter().text(
        toast_rect.center(),
        egui::Align2::CENTER_CENTER,
        &toast.message,
        font,
        egui::Color32::from_white_alpha((255.0 * alpha) as u8),
    );
}

/// Render the open visit popup next to its anchor.
///
/// Returns the popup signal produced by its buttons, if any.
pub fn visit_popup(ctx: &egui::Context, engine: &WalkersEngine) -> Option<MapEvent> {
    let (popup, content) = engine.popup()?;
    let anchor = engine
        .popup_screen_pos()
        .unwrap_or_else(|| ctx.viewport_rect().center());

    let mut signal = None;
    egui::Area::new(egui::Id::new(("visit_popup", popup.0)))
        .fixed_pos(anchor)
        .pivot(egui::Align2::CENTER_BOTTOM)
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.strong(&content.title);
                    if ui.small_button("✕").clicked() {
                        signal = Some(MapEvent::PopupClosed(popup));
                    }
                });
                if ui.button(&content.confirm_label).clicked() {
                    signal = Some(MapEvent::PopupConfirmed(popup));
                }
            });
        });

    if signal.is_none() && ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
        tracing::debug!("Popup {popup:?} dismissed with Escape");
        signal = Some(MapEvent::PopupClosed(popup));
    }
    signal
}

/// Explain a denied location permission and how to grant it
pub fn location_error_window(
    ctx: &egui::Context,
    notice: &mut PermissionNotice,
    failure: Option<LocationErrorKind>,
) {
    if !notice.is_visible() {
        return;
    }

    let guidance = failure
        .unwrap_or(LocationErrorKind::PermissionDenied)
        .guidance();

    let mut open = true;
    let mut dismissed = false;
    egui::Window::new(guidance.title)
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
        .open(&mut open)
        .show(ctx, |ui| {
            ui.label(guidance.message);
            ui.add_space(8.0);
            for step in guidance.help {
                ui.label(format!("• {step}"));
            }
            ui.add_space(8.0);
            ui.vertical_centered(|ui| {
                if ui.button("Got it").clicked() {
                    dismissed = true;
                }
            });
        });

    if !open || dismissed {
        notice.dismiss();
    }
}

/// Tile attribution at the bottom of the map
pub fn attribution(ui: &Ui, text: &str) {
    let screen_rect = ui.max_rect();
    ui.painter().text(
        screen_rect.center_bottom() + egui::vec2(0.0, -5.0),
        egui::Align2::CENTER_BOTTOM,
        text,
        egui::FontId::proportional(10.0),
        egui::Color32::from_black_alpha(180),
    );
}
