// The wire messages are prost-derived structs in src/mr/rpc.rs, so only the
// service stubs are generated here and no protoc install is required.

fn method(name: &str, route: &str, input: &str, output: &str) -> tonic_build::manual::Method {
    tonic_build::manual::Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::mr::rpc::proto::{}", input))
        .output_type(format!("crate::mr::rpc::proto::{}", output))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let service = tonic_build::manual::Service::builder()
        .name("MapReduceService")
        .package("statusmr")
        .method(method("process_map", "ProcessMap", "MapRequest", "MapResponse"))
        .method(method("process_reduce", "ProcessReduce", "ReduceRequest", "ReduceResponse"))
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
}
