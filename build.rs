fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the bpfd loader API (client side only, the daemon is external)
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/bpfd.proto"], &["proto"])?;

    // Re-run if proto files change
    println!("cargo:rerun-if-changed=proto/bpfd.proto");

    Ok(())
}
