fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Release pipelines export the commit explicitly when building outside a checkout
    println!("cargo:rerun-if-env-changed=SELLSCALE_GIT_HASH");
    if let Ok(hash) = std::env::var("SELLSCALE_GIT_HASH") {
        println!("cargo:rustc-env=SELLSCALE_GIT_HASH={}", hash);
    }
}
