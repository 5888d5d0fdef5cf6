fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = std::env::var("OUT_DIR")?;

    tonic_prost_build::configure()
        .file_descriptor_set_path(format!("{}/agent_descriptor.bin", out_dir))
        .compile_protos(&["proto/agent.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/agent.proto");

    Ok(())
}
