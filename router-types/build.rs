fn main() -> Result<(), Box<dyn std::error::Error>> {
    // `bytes_type` makes prost decode the `payload` field of `DataFrame`
    // into a `bytes::Bytes` rather than a `Vec<u8>`. `Bytes` is a refcounted
    // view into the original receive buffer, so decoding a `Data` frame does
    // not copy the payload out of the buffer h2/tonic handed us. This is the
    // zero-copy forwarding path the Splicer relies on — see
    // `osmo-router-core::codec` for the accompanying conformance test.
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .bytes(["osmo.router.v1.DataFrame.payload"])
        .compile_protos(&["proto/session.proto"], &["proto"])?;
    Ok(())
}
