fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Locate protoc via the vendored binary when it isn't on PATH, so the
    // build is self-contained in environments without a system protoc.
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            unsafe {
                std::env::set_var("PROTOC", protoc);
            }
        }
    }
    tonic_build::compile_protos("proto/ads.proto")?;
    Ok(())
}
