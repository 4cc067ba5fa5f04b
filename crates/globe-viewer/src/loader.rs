//! Startup loading of the point data and scene assets.
//!
//! The point data arrives either through the asset server (`.geojson`
//! assets) or over HTTP on a background task. Either way the cluster index
//! is built off the main thread and handed back over an `async_channel`.
//! Once the index, both models and the surface texture are in, the globe and
//! the tier table are built and the phase moves to [`StartupPhase::Ready`].
//!
//! Any failure is logged and moves the phase to [`StartupPhase::Failed`].
//! Nothing is retried.

use std::fmt;

use bevy::asset::io::Reader;
use bevy::asset::{
    AssetLoader, LoadContext, LoadState, RecursiveDependencyLoadState, UntypedAssetId,
};
use bevy::ecs::message::{Message, MessageWriter};
use bevy::gltf::{Gltf, GltfMesh};
use bevy::prelude::*;
use geocluster::{ClusterIndex, ClusterOptions, PointFeature};
use rand::SeedableRng;
use rand::rngs::StdRng;
use web_time::Instant;

use crate::async_runtime::TaskSpawner;
use crate::frame::GlobeSpin;
use crate::launch_params::{DataSource, LaunchParams};
use crate::marker::MarkerTemplate;
use crate::scene::spawn_globe;
use crate::tiers::build_tier_table;

/// Marker model; its first mesh is the template.
const UFO_MODEL: &str = "models/ufo.glb";
/// Continent model; its first mesh is the landmass.
const CONTINENT_MODEL: &str = "models/continent.glb";
/// Surface texture applied to the continent.
const SURFACE_TEXTURE: &str = "textures/continent.jpg";

/// Plugin for startup loading.
pub struct DataLoaderPlugin;

impl Plugin for DataLoaderPlugin {
    fn build(&self, app: &mut App) {
        app.init_asset::<PlacesAsset>()
            .register_asset_loader(PlacesAssetLoader)
            .init_resource::<StartupPhase>()
            .init_resource::<LoaderState>()
            .add_message::<ClusterIndexReady>()
            .add_systems(Startup, start_loading)
            .add_systems(
                Update,
                (
                    check_asset_failures,
                    poll_places_asset,
                    poll_index_task,
                    finish_startup,
                )
                    .chain()
                    .run_if(is_loading),
            );
    }
}

/// Where startup stands.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StartupPhase {
    #[default]
    Loading,
    Ready,
    Failed,
}

/// Run condition: the scene has been built.
pub fn scene_ready(phase: Res<StartupPhase>) -> bool {
    *phase == StartupPhase::Ready
}

/// Run condition: startup is still in progress.
pub fn is_loading(phase: Res<StartupPhase>) -> bool {
    *phase == StartupPhase::Loading
}

/// Sent once when the cluster index has been built.
#[derive(Message, Debug, Clone)]
pub struct ClusterIndexReady {
    pub point_count: usize,
}

/// The cluster index over all loaded points.
#[derive(Resource)]
pub struct PlaceIndex(pub ClusterIndex);

/// Errors that can occur during startup loading.
#[derive(Debug)]
pub enum LoadError {
    /// Reading an asset failed.
    Io(std::io::Error),
    /// The HTTP request failed.
    Http(reqwest::Error),
    /// The server answered with a non-success status.
    HttpStatus(u16),
    /// The point data was malformed or the index could not be built.
    Data(geocluster::Error),
    /// An asset failed to load.
    Asset { path: String, detail: String },
    /// A model had nothing usable in it.
    Model { path: &'static str },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {e}"),
            LoadError::Http(e) => write!(f, "HTTP request failed: {e}"),
            LoadError::HttpStatus(status) => write!(f, "HTTP {status}"),
            LoadError::Data(e) => write!(f, "bad point data: {e}"),
            LoadError::Asset { path, detail } => {
                write!(f, "failed to load {path}: {detail}")
            }
            LoadError::Model { path } => write!(f, "{path} has no mesh with positions"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            LoadError::Http(e) => Some(e),
            LoadError::Data(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(e: reqwest::Error) -> Self {
        LoadError::Http(e)
    }
}

impl From<geocluster::Error> for LoadError {
    fn from(e: geocluster::Error) -> Self {
        LoadError::Data(e)
    }
}

/// Point features parsed from a `.geojson` file.
#[derive(Asset, TypePath, Debug)]
pub struct PlacesAsset {
    pub points: Vec<PointFeature>,
}

impl PlacesAsset {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        Ok(Self {
            points: geocluster::parse_feature_collection(bytes)?,
        })
    }
}

/// Loader for GeoJSON point collections.
#[derive(Default, TypePath)]
struct PlacesAssetLoader;

impl AssetLoader for PlacesAssetLoader {
    type Asset = PlacesAsset;
    type Settings = ();
    type Error = LoadError;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        PlacesAsset::from_bytes(&bytes)
    }

    fn extensions(&self) -> &[&str] {
        &["geojson"]
    }
}

/// Handles of everything the scene needs.
///
/// Models are loaded through their root `Gltf` handle. A file that exists
/// but fails to decode only marks the root as failed, so a labelled
/// sub-asset handle would wait forever.
#[derive(Resource, Debug, Clone)]
pub struct SceneAssets {
    pub ufo: Handle<Gltf>,
    pub continent: Handle<Gltf>,
    pub surface: Handle<Image>,
    /// Set when the point data comes through the asset server.
    pub places: Option<Handle<PlacesAsset>>,
}

impl SceneAssets {
    fn ids(&self) -> Vec<(String, UntypedAssetId)> {
        let mut ids = vec![
            (UFO_MODEL.to_string(), self.ufo.id().untyped()),
            (CONTINENT_MODEL.to_string(), self.continent.id().untyped()),
            (SURFACE_TEXTURE.to_string(), self.surface.id().untyped()),
        ];
        if let Some(places) = &self.places {
            let path = places
                .path()
                .map_or_else(|| "point data".to_string(), ToString::to_string);
            ids.push((path, places.id().untyped()));
        }
        ids
    }
}

/// Progress of the index build.
#[derive(Resource)]
pub struct LoaderState {
    started: Instant,
    index_requested: bool,
    index_rx: async_channel::Receiver<Result<ClusterIndex, LoadError>>,
    index_tx: async_channel::Sender<Result<ClusterIndex, LoadError>>,
}

impl Default for LoaderState {
    fn default() -> Self {
        let (index_tx, index_rx) = async_channel::bounded(1);
        Self {
            started: Instant::now(),
            index_requested: false,
            index_rx,
            index_tx,
        }
    }
}

/// Build the cluster index, logging how long the points took to arrive.
pub fn build_index(
    points: Vec<PointFeature>,
    options: ClusterOptions,
    started: Instant,
) -> Result<ClusterIndex, LoadError> {
    tracing::info!(
        "loaded {} points in {:.3}s",
        points.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(ClusterIndex::load(points, options)?)
}

/// Fetch a GeoJSON document and build its index.
async fn fetch_index(
    url: String,
    options: ClusterOptions,
    started: Instant,
) -> Result<ClusterIndex, LoadError> {
    let response = reqwest::get(&url).await?;
    if !response.status().is_success() {
        return Err(LoadError::HttpStatus(response.status().as_u16()));
    }
    let bytes = response.bytes().await?;
    let places = PlacesAsset::from_bytes(&bytes)?;
    build_index(places.points, options, started)
}

fn fail(phase: &mut StartupPhase, error: &LoadError) {
    tracing::error!("Startup failed: {error}");
    *phase = StartupPhase::Failed;
}

/// Queue every asset load and, for URL sources, the fetch.
#[allow(clippy::needless_pass_by_value)]
fn start_loading(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    params: Res<LaunchParams>,
    mut state: ResMut<LoaderState>,
    spawner: TaskSpawner,
) {
    state.started = Instant::now();

    let places = match &params.data {
        DataSource::Asset(path) => {
            tracing::info!("Loading point data from asset {path}");
            Some(asset_server.load::<PlacesAsset>(path.clone()))
        }
        DataSource::Url(url) => {
            tracing::info!("Fetching point data from {url}");
            let url = url.clone();
            let options = params.cluster.clone();
            let started = state.started;
            spawner.spawn_reporting(state.index_tx.clone(), fetch_index(url, options, started));
            state.index_requested = true;
            None
        }
    };

    commands.insert_resource(SceneAssets {
        ufo: asset_server.load(UFO_MODEL),
        continent: asset_server.load(CONTINENT_MODEL),
        surface: asset_server.load(SURFACE_TEXTURE),
        places,
    });
}

/// The first asset that failed to load, itself or through a dependency.
fn asset_failure(
    asset_server: &AssetServer,
    ids: Vec<(String, UntypedAssetId)>,
) -> Option<LoadError> {
    ids.into_iter().find_map(|(path, id)| {
        let error = match (
            asset_server.load_state(id),
            asset_server.recursive_dependency_load_state(id),
        ) {
            (LoadState::Failed(error), _) | (_, RecursiveDependencyLoadState::Failed(error)) => {
                error
            }
            _ => return None,
        };
        Some(LoadError::Asset {
            path,
            detail: error.to_string(),
        })
    })
}

#[allow(clippy::needless_pass_by_value)]
fn check_asset_failures(
    asset_server: Res<AssetServer>,
    scene_assets: Option<Res<SceneAssets>>,
    mut phase: ResMut<StartupPhase>,
) {
    let Some(scene_assets) = scene_assets else {
        return;
    };
    if let Some(error) = asset_failure(&asset_server, scene_assets.ids()) {
        fail(&mut phase, &error);
    }
}

/// Start the index build once the asset-server point data is in.
#[allow(clippy::needless_pass_by_value)]
fn poll_places_asset(
    mut state: ResMut<LoaderState>,
    scene_assets: Option<Res<SceneAssets>>,
    places_assets: Res<Assets<PlacesAsset>>,
    params: Res<LaunchParams>,
    spawner: TaskSpawner,
) {
    if state.index_requested {
        return;
    }
    let Some(places) = scene_assets
        .as_ref()
        .and_then(|assets| assets.places.as_ref())
        .and_then(|handle| places_assets.get(handle))
    else {
        return;
    };

    let points = places.points.clone();
    let options = params.cluster.clone();
    let started = state.started;
    spawner.spawn_reporting(state.index_tx.clone(), async move {
        build_index(points, options, started)
    });
    state.index_requested = true;
}

#[allow(clippy::needless_pass_by_value)]
fn poll_index_task(
    mut commands: Commands,
    state: Res<LoaderState>,
    mut phase: ResMut<StartupPhase>,
    mut ready: MessageWriter<ClusterIndexReady>,
) {
    let Ok(result) = state.index_rx.try_recv() else {
        return;
    };

    match result {
        Ok(index) => {
            let point_count = index.point_count();
            tracing::info!(
                "Cluster index ready: {point_count} points after {:.3}s",
                state.started.elapsed().as_secs_f64()
            );
            commands.insert_resource(PlaceIndex(index));
            ready.write(ClusterIndexReady { point_count });
            notify_page_ready();
        }
        Err(e) => fail(&mut phase, &e),
    }
}

/// Mesh handles of every primitive in the first mesh of a loaded model.
fn first_mesh_primitives(
    gltfs: &Assets<Gltf>,
    gltf_meshes: &Assets<GltfMesh>,
    model: &Handle<Gltf>,
    path: &'static str,
) -> Result<Vec<Handle<Mesh>>, LoadError> {
    let primitives: Vec<Handle<Mesh>> = gltfs
        .get(model)
        .and_then(|gltf| gltf.meshes.first())
        .and_then(|mesh| gltf_meshes.get(mesh))
        .map(|mesh| mesh.primitives.iter().map(|p| p.mesh.clone()).collect())
        .unwrap_or_default();
    if primitives.is_empty() {
        return Err(LoadError::Model { path });
    }
    Ok(primitives)
}

/// Build the globe and the markers once everything is loaded.
#[allow(clippy::needless_pass_by_value, clippy::too_many_arguments)]
fn finish_startup(
    mut commands: Commands,
    mut phase: ResMut<StartupPhase>,
    params: Res<LaunchParams>,
    asset_server: Res<AssetServer>,
    scene_assets: Option<Res<SceneAssets>>,
    index: Option<Res<PlaceIndex>>,
    spin: Res<GlobeSpin>,
    gltfs: Res<Assets<Gltf>>,
    gltf_meshes: Res<Assets<GltfMesh>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    if *phase != StartupPhase::Loading {
        return;
    }
    let (Some(scene_assets), Some(index)) = (scene_assets, index) else {
        return;
    };
    let loaded = [
        scene_assets.ufo.id().untyped(),
        scene_assets.continent.id().untyped(),
        scene_assets.surface.id().untyped(),
    ]
    .into_iter()
    .all(|id| asset_server.is_loaded_with_dependencies(id));
    if !loaded {
        return;
    }

    let primitives = first_mesh_primitives(&gltfs, &gltf_meshes, &scene_assets.ufo, UFO_MODEL)
        .and_then(|ufo| {
            let continent = first_mesh_primitives(
                &gltfs,
                &gltf_meshes,
                &scene_assets.continent,
                CONTINENT_MODEL,
            )?;
            Ok((ufo, continent))
        });
    let (ufo_primitives, continent_primitives) = match primitives {
        Ok(primitives) => primitives,
        Err(e) => {
            fail(&mut phase, &e);
            return;
        }
    };

    let Some(template) = MarkerTemplate::from_meshes(
        ufo_primitives,
        &meshes,
        Color::srgb_u8(0xdc, 0xfd, 0x7c),
    ) else {
        fail(&mut phase, &LoadError::Model { path: UFO_MODEL });
        return;
    };

    spawn_globe(
        &mut commands,
        &mut meshes,
        &mut materials,
        &continent_primitives,
        scene_assets.surface.clone(),
        spin.angle,
    );

    let mut rng = StdRng::seed_from_u64(params.seed);
    let table = build_tier_table(
        &mut commands,
        &mut materials,
        &template,
        &index.0,
        &params.tiers,
        &mut rng,
    );

    commands.insert_resource(table);
    commands.insert_resource(template);
    *phase = StartupPhase::Ready;
    tracing::info!("Scene ready");
}

/// Tell the embedding page that the data is ready.
#[cfg(target_family = "wasm")]
fn notify_page_ready() {
    use wasm_bindgen::{JsCast, JsValue};

    let global = js_sys::global();
    let message = js_sys::Object::new();
    if js_sys::Reflect::set(&message, &JsValue::from_str("ready"), &JsValue::TRUE).is_err() {
        return;
    }

    let post = js_sys::Reflect::get(&global, &JsValue::from_str("postMessage"))
        .ok()
        .and_then(|f| f.dyn_into::<js_sys::Function>().ok());
    match post {
        Some(post) => {
            if let Err(e) = post.call1(&global, &message) {
                tracing::warn!("postMessage failed: {e:?}");
            }
        }
        None => tracing::warn!("postMessage is not available"),
    }
}

#[cfg(not(target_family = "wasm"))]
fn notify_page_ready() {}
