//! Integration tests for the rpcwire wire protocol.
//!
//! These tests drive the public codec and framing API end to end, the way a
//! peer on the other side of the socket would see it.

use std::sync::Arc;

use rpcwire::codec::{ids, CodecRegistry, MsgPackCodec};
use rpcwire::protocol::{
    build_frame, FrameBuffer, Header, MessageBody, MessageCodec, MessageDecoder, MessageType,
    RpcMessage, RpcRequest, RpcResponse, HEADER_SIZE, MAGIC_NUMBER, VERSION,
};
use rpcwire::RpcError;
use serde_json::json;

fn codec() -> MessageCodec {
    MessageCodec::new(Arc::new(CodecRegistry::with_defaults()))
}

fn sample_request(id: u32) -> RpcRequest {
    let mut request = RpcRequest::new("demo.Inventory", "reserve")
        .param("String", json!("sku-42"))
        .param("int", json!(3))
        .param("java.util.Map", json!({"warehouse": "east", "rush": true}))
        .version("2.0")
        .group("retail");
    request.request_id = id;
    request
}

fn sample_messages(codec_id: u8, compress_id: u8) -> Vec<RpcMessage> {
    vec![
        RpcMessage::request(sample_request(11), codec_id, compress_id),
        RpcMessage::response(
            RpcResponse::success(11, json!({"reserved": 3, "left": [1, 2, 3]})),
            codec_id,
            compress_id,
        ),
        RpcMessage::response(RpcResponse::fail(12, "out of stock"), codec_id, compress_id),
        RpcMessage {
            message_type: MessageType::Request,
            codec: codec_id,
            compress: compress_id,
            request_id: 13,
            body: MessageBody::Empty,
        },
        RpcMessage::ping(codec_id, compress_id),
        RpcMessage::pong(0, codec_id, compress_id),
    ]
}

/// Every built-in serializer/compressor pairing round-trips every message kind.
#[test]
fn test_roundtrip_all_codec_pairs() {
    let codec = codec();

    for codec_id in [ids::MSGPACK, ids::JSON] {
        for compress_id in [ids::NO_COMPRESSION, ids::GZIP] {
            for message in sample_messages(codec_id, compress_id) {
                let bytes = codec.encode(&message).unwrap();

                let header = Header::decode(&bytes).unwrap();
                assert_eq!(header.full_length as usize, bytes.len());
                assert_eq!(header.codec, codec_id);
                assert_eq!(header.compress, compress_id);

                let mut decoder = MessageDecoder::new(codec.clone());
                let decoded = decoder.push(&bytes).unwrap();
                assert_eq!(decoded, vec![message], "codec {} compress {}", codec_id, compress_id);
            }
        }
    }
}

/// A stream of frames decodes identically no matter where it is split.
#[test]
fn test_every_split_point() {
    let codec = codec();
    let messages = sample_messages(ids::MSGPACK, ids::GZIP);

    let stream: Vec<u8> = messages
        .iter()
        .flat_map(|m| codec.encode(m).unwrap().to_vec())
        .collect();

    for split in 0..=stream.len() {
        let mut decoder = MessageDecoder::new(codec.clone());
        let mut decoded = decoder.push(&stream[..split]).unwrap();
        decoded.extend(decoder.push(&stream[split..]).unwrap());

        assert_eq!(decoded, messages, "split at {}", split);
        assert_eq!(decoder.buffered(), 0);
    }
}

/// Feeding one byte at a time yields each message exactly when its last byte arrives.
#[test]
fn test_byte_at_a_time() {
    let codec = codec();
    let message = RpcMessage::request(sample_request(77), ids::JSON, ids::GZIP);
    let bytes = codec.encode(&message).unwrap();

    let mut decoder = MessageDecoder::new(codec);
    for (i, byte) in bytes.iter().enumerate() {
        let out = decoder.push(std::slice::from_ref(byte)).unwrap();
        if i + 1 < bytes.len() {
            assert!(out.is_empty(), "message emitted early at byte {}", i);
        } else {
            assert_eq!(out, vec![message.clone()]);
        }
    }
}

/// Corrupting the magic or version is a protocol error and yields no message.
#[test]
fn test_magic_and_version_rejected() {
    let codec = codec();
    let good = codec
        .encode(&RpcMessage::request(sample_request(5), ids::MSGPACK, ids::NO_COMPRESSION))
        .unwrap()
        .to_vec();

    let mut bad_magic = good.clone();
    bad_magic[0] ^= 0xFF;
    assert_ne!(&bad_magic[..4], &MAGIC_NUMBER);

    let mut bad_version = good.clone();
    bad_version[4] = VERSION.wrapping_add(1);

    for bytes in [bad_magic, bad_version] {
        let mut decoder = MessageDecoder::new(codec.clone());
        let err = decoder.push(&bytes).unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
        assert!(err.is_fatal_to_connection());
    }
}

/// Unknown message types are rejected at the header.
#[test]
fn test_unknown_message_type_rejected() {
    let mut bytes = build_frame(&Header::new(MessageType::Request, ids::MSGPACK, 0, 1, 0), &[]);
    bytes[9] = 9;

    let mut buffer = FrameBuffer::new();
    assert!(matches!(buffer.push(&bytes), Err(RpcError::Protocol(_))));
}

/// A frame longer than the configured limit is rejected before its body arrives.
#[test]
fn test_oversized_frame_rejected_from_header() {
    let header = Header::new(MessageType::Response, ids::MSGPACK, 0, 1, 4096);
    let mut decoder = MessageDecoder::new(codec().with_max_frame_length(1024));

    let err = decoder.push(&header.encode()).unwrap_err();
    assert!(err.to_string().contains("exceeds maximum"));
}

/// Raw frames built by hand decode through the message layer.
#[test]
fn test_hand_built_frame() {
    let response = RpcResponse::success(321, json!(["a", "b"]));
    let body = MsgPackCodec::encode(&response).unwrap();
    let header = Header::new(
        MessageType::Response,
        ids::MSGPACK,
        ids::NO_COMPRESSION,
        321,
        body.len() as u32,
    );
    let bytes = build_frame(&header, &body);
    assert_eq!(bytes.len(), HEADER_SIZE + body.len());

    let mut decoder = MessageDecoder::new(codec());
    let decoded = decoder.push(&bytes).unwrap().remove(0);
    assert_eq!(decoded.request_id, 321);
    assert_eq!(decoded.body, MessageBody::Response(response));
}

/// Coalesced frames with different codecs decode independently.
#[test]
fn test_mixed_codecs_in_one_stream() {
    let codec = codec();
    let a = RpcMessage::request(sample_request(1), ids::MSGPACK, ids::GZIP);
    let b = RpcMessage::request(sample_request(2), ids::JSON, ids::NO_COMPRESSION);

    let mut stream = codec.encode(&a).unwrap().to_vec();
    stream.extend_from_slice(&codec.encode(&b).unwrap());

    let decoded = MessageDecoder::new(codec).push(&stream).unwrap();
    assert_eq!(decoded, vec![a, b]);
}
