fn main() -> Result<(), Box<dyn std::error::Error>> {
    // no system protoc needed
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    tonic_build::compile_protos("proto/orchestrator.proto")?;
    Ok(())
}
