fn main() {
    protobuf_codegen::Codegen::new()
        .pure()
        .includes(["proto"])
        .input("proto/content_manifest.proto")
        .cargo_out_dir("protos")
        .run_from_script();
    println!("cargo:rerun-if-changed=proto/content_manifest.proto");
}
