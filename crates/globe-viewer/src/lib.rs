//! Interactive globe with zoom-clustered location markers using Bevy.
//!
//! Point data is clustered once per zoom tier by [`geocluster`]. Each tier
//! gets its own set of UFO markers; the orbit distance picks the tier and the
//! markers cross-fade as the camera zooms.

pub mod async_runtime;
pub mod bounds;
pub mod camera;
pub mod frame;
pub mod launch_params;
pub mod loader;
pub mod marker;
pub mod scene;
pub mod tiers;
pub mod transition;
pub mod ui;
pub mod zoom;

use bevy::prelude::*;

use crate::async_runtime::AsyncRuntimePlugin;
use crate::camera::OrbitCameraPlugin;
use crate::frame::MarkerAnimationPlugin;
use crate::hit_test::HitTestPlugin;
use crate::launch_params::LaunchParams;
use crate::loader::DataLoaderPlugin;
use crate::scene::GlobeScenePlugin;
use crate::ui::DebugUiPlugin;

/// Plugin for the whole viewer, configured by launch parameters.
pub struct GlobeViewerPlugin {
    pub params: LaunchParams,
}

impl Plugin for GlobeViewerPlugin {
    fn build(&self, app: &mut App) {
        tracing::info!(
            "Tiers {:?}, {:.1}s cross-fade",
            self.params.tiers.iter().collect::<Vec<_>>(),
            self.params.transition_secs
        );

        app.insert_resource(self.params.classifier())
            .insert_resource(self.params.transition())
            .insert_resource(self.params.clone())
            .add_plugins((
                AsyncRuntimePlugin,
                OrbitCameraPlugin,
                GlobeScenePlugin,
                DataLoaderPlugin,
                MarkerAnimationPlugin,
                HitTestPlugin,
                DebugUiPlugin,
            ));
    }
}
