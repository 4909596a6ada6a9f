fn main() {
    // The Tauri context is only generated for the application shell
    #[cfg(feature = "app")]
    tauri_build::build()
}
