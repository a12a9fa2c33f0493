fn main() {
    println!("cargo:rerun-if-changed=proto/mobfs.proto");
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", protoc);
        }
    }
    if let Err(err) = tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/mobfs.proto"], &["proto"])
    {
        panic!("failed to compile mobfs proto: {err}");
    }
}
