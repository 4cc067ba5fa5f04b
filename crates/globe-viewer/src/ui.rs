//! Debug UI for displaying frame rate, zoom state and hovered markers.

use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_egui::{EguiContexts, EguiPlugin, EguiPrimaryContextPass, egui};

use crate::frame::MarkerFrameStats;
use crate::hit_test::HoveredMarkers;
use crate::loader::{PlaceIndex, StartupPhase};
use crate::tiers::TierTable;
use crate::transition::ZoomTransition;

/// Plugin for debug UI overlay.
pub struct DebugUiPlugin;

impl Plugin for DebugUiPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(EguiPlugin::default())
            .add_plugins(FrameTimeDiagnosticsPlugin::default())
            .add_systems(EguiPrimaryContextPass, debug_ui_system);
    }
}

/// Render the debug UI overlay.
#[allow(clippy::needless_pass_by_value, clippy::too_many_arguments)]
fn debug_ui_system(
    mut contexts: EguiContexts,
    diagnostics: Res<DiagnosticsStore>,
    phase: Res<StartupPhase>,
    stats: Res<MarkerFrameStats>,
    hovered: Res<HoveredMarkers>,
    transition: Res<ZoomTransition>,
    index: Option<Res<PlaceIndex>>,
    table: Option<Res<TierTable>>,
) -> Result {
    let ctx = contexts.ctx_mut()?;

    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(bevy::diagnostic::Diagnostic::smoothed)
        .unwrap_or(0.0);

    egui::Window::new("Debug")
        .default_pos([10.0, 10.0])
        .show(ctx, |ui| {
            ui.label(format!("FPS: {fps:.0}"));

            match *phase {
                StartupPhase::Loading => {
                    ui.label("Loading...");
                    return;
                }
                StartupPhase::Failed => {
                    ui.colored_label(egui::Color32::RED, "Loading failed, see log");
                    return;
                }
                StartupPhase::Ready => {}
            }

            if let Some(index) = &index {
                ui.label(format!("Points: {}", index.0.point_count()));
            }
            if let Some(table) = &table {
                ui.label(format!("Markers: {}", table.marker_count()));
            }
            ui.label(format!("Distance: {:.1}", stats.distance));

            ui.separator();
            ui.label(format!("Tier: {}", transition.current()));
            let fading = stats
                .fade
                .and_then(|fade| fade.previous.map(|previous| (fade.progress, previous)));
            if let Some((progress, previous)) = fading {
                ui.label(format!("Fading from {previous}: {:.0}%", progress * 100.0));
                ui.label(format!(
                    "Visible: {} + {}",
                    stats.current_markers, stats.previous_markers
                ));
            } else {
                ui.label(format!("Visible: {}", stats.current_markers));
            }

            if !hovered.0.is_empty() {
                ui.separator();
                for marker in &hovered.0 {
                    let label = marker.label.as_deref().unwrap_or("(unnamed)");
                    ui.label(format!("{label} ({:.1})", marker.distance));
                }
            }

            ui.separator();
            ui.label("Controls:");
            ui.label("  Left drag - Orbit");
            ui.label("  Scroll - Zoom");
            ui.label("  Hover - Highlight markers");
        });

    Ok(())
}
