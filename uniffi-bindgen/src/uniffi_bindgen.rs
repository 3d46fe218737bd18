//! Entry point for generating foreign-language bindings for VerifyKit.

fn main() {
    uniffi::uniffi_bindgen_main();
}
