//! Build-time capability registries.
//!
//! An API is how one plugin lets others contribute to it while the server
//! is being built: the flow engine collects flow declarations and hooks
//! through APIs, then reads them once at boot. Providers are the runtime
//! counterpart, resolved by flows and shared with every call.
//!
//! | | API | Provider |
//! |---|---|---|
//! | Used by | plugins | flows and hooks |
//! | Reached through | `server.api::<A>()` | `providers.get::<T>()` |
//! | Used during | build and ready | boot and calls |
//!
//! `server.api::<A>()` hands out `&A`, so registries keep their contents
//! behind a lock:
//!
//! ```ignore
//! #[derive(Default)]
//! pub struct RouteAPI {
//!     routes: RwLock<Vec<String>>,
//! }
//!
//! impl API for RouteAPI {}
//!
//! impl RouteAPI {
//!     pub fn add(&self, path: impl Into<String>) {
//!         self.routes.write().push(path.into());
//!     }
//! }
//! ```

/// Marker trait for build-time registries stored on the server.
///
/// ```ignore
/// // the owner installs it
/// server.insert_api(RouteAPI::default());
///
/// // dependents contribute during their own build
/// server
///     .api::<RouteAPI>()
///     .expect("RoutesPlugin must be added first")
///     .add("/tools/call");
/// ```
pub trait API: Send + Sync + 'static {}
