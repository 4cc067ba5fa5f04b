//! Background task spawning for native and WASM.
//!
//! The loader uses this for the two pieces of startup work that must stay
//! off the main thread: fetching a remote GeoJSON document and building the
//! cluster index. Both report back over the loader's `async_channel`, so a
//! task never touches the `World`.
//!
//! Native builds run tasks on a Tokio runtime (`bevy_tokio_tasks`), which
//! `reqwest` needs. WASM builds use Bevy's `AsyncComputeTaskPool`, where
//! `reqwest` goes through the browser's fetch and the index build runs on
//! the page's only thread.

use bevy::prelude::*;

/// Installs the async runtime for the current platform.
pub struct AsyncRuntimePlugin;

impl Plugin for AsyncRuntimePlugin {
    fn build(&self, app: &mut App) {
        #[cfg(target_family = "wasm")]
        let _ = app;

        #[cfg(not(target_family = "wasm"))]
        app.add_plugins(bevy_tokio_tasks::TokioTasksPlugin::default());
    }
}

#[cfg(not(target_family = "wasm"))]
mod native {
    use std::future::Future;

    use bevy::ecs::system::SystemParam;
    use bevy::prelude::*;

    /// Spawns the GeoJSON fetch and the index build.
    ///
    /// Results travel back to the loader over `async_channel`.
    #[derive(SystemParam)]
    pub struct TaskSpawner<'w, 's> {
        runtime: Res<'w, bevy_tokio_tasks::TokioTasksRuntime>,
        // Keeps the lifetimes identical to the WASM variant.
        #[allow(dead_code)]
        _local: Local<'s, ()>,
    }

    impl TaskSpawner<'_, '_> {
        pub fn spawn<F>(&self, future: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            self.runtime.spawn_background_task(move |_ctx| future);
        }

        /// Run `future` and send its output to `tx`. If the receiver is
        /// gone the output is dropped.
        pub fn spawn_reporting<T, F>(&self, tx: async_channel::Sender<T>, future: F)
        where
            T: Send + 'static,
            F: Future<Output = T> + Send + 'static,
        {
            self.spawn(async move {
                let _ = tx.send(future.await).await;
            });
        }
    }
}

#[cfg(target_family = "wasm")]
mod wasm {
    use std::future::Future;

    use bevy::ecs::system::SystemParam;
    use bevy::prelude::*;
    use bevy::tasks::AsyncComputeTaskPool;

    /// Spawns the GeoJSON fetch and the index build.
    ///
    /// The browser is single-threaded, so futures need not be `Send`.
    #[derive(SystemParam)]
    pub struct TaskSpawner<'w, 's> {
        #[allow(dead_code)]
        _local: Local<'s, ()>,
        #[allow(dead_code)]
        _marker: std::marker::PhantomData<&'w ()>,
    }

    impl TaskSpawner<'_, '_> {
        pub fn spawn<F>(&self, future: F)
        where
            F: Future<Output = ()> + 'static,
        {
            AsyncComputeTaskPool::get().spawn_local(future).detach();
        }

        /// Run `future` and send its output to `tx`. If the receiver is
        /// gone the output is dropped.
        pub fn spawn_reporting<T, F>(&self, tx: async_channel::Sender<T>, future: F)
        where
            T: 'static,
            F: Future<Output = T> + 'static,
        {
            self.spawn(async move {
                let _ = tx.send(future.await).await;
            });
        }
    }
}

#[cfg(not(target_family = "wasm"))]
pub use native::TaskSpawner;
#[cfg(target_family = "wasm")]
pub use wasm::TaskSpawner;
