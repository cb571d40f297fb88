//! Browser-only setup. Routes Rust panics to the browser console instead of a bare abort.

#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub fn set_panic_hook() {
    console_error_panic_hook::set_once();
}
