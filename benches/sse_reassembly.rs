use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lilith_bridge::mcp::interpreter::interpret;
use lilith_bridge::mcp::sse::SseDecoder;
use lilith_bridge::protocol::envelope::decode_envelope;
use tokio_util::codec::Decoder;

fn stream_payload(messages: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for id in 0..messages {
        out.extend_from_slice(
            format!(
                "event: message\ndata: {{\"jsonrpc\":\"2.0\",\"id\":{},\"result\":{{\"content\":[]}}}}\n\n",
                id
            )
            .as_bytes(),
        );
    }
    out
}

fn bench_sse_decoder(c: &mut Criterion) {
    let payload = stream_payload(64);

    c.bench_function("sse_decode_whole_buffer", |b| {
        b.iter(|| {
            let mut decoder = SseDecoder::default();
            let mut src = BytesMut::from(&payload[..]);
            let mut count = 0;
            while let Ok(Some(_)) = decoder.decode(black_box(&mut src)) {
                count += 1;
            }
            count
        })
    });

    c.bench_function("sse_decode_small_chunks", |b| {
        b.iter(|| {
            let mut decoder = SseDecoder::default();
            let mut src = BytesMut::new();
            let mut count = 0;
            for chunk in payload.chunks(64) {
                src.extend_from_slice(chunk);
                while let Ok(Some(_)) = decoder.decode(black_box(&mut src)) {
                    count += 1;
                }
            }
            count
        })
    });
}

fn bench_envelope(c: &mut Criterion) {
    let call = br#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"get_weather","arguments":{"city":"Oslo"}}}"#;
    c.bench_function("decode_envelope_tools_call", |b| {
        b.iter(|| decode_envelope(black_box(call)))
    });

    let wrapped = b"event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[]}}\n\n";
    c.bench_function("interpret_event_stream_body", |b| {
        b.iter(|| interpret(black_box(wrapped), Some("text/event-stream")))
    });
}

criterion_group!(benches, bench_sse_decoder, bench_envelope);
criterion_main!(benches);
