use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=src");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let Ok(crate_dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let config = cbindgen::Config::from_file("cbindgen.toml").unwrap_or_default();

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            let include = Path::new(&crate_dir).join("include");
            let _ = std::fs::create_dir_all(&include);
            bindings.write_to_file(include.join("sr_runtime.h"));
        }
        Err(e) => println!("cargo:warning=skipping C header generation: {}", e),
    }
}
