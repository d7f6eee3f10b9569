//! Wire codec round trips over a real framed transport.

use futures::{SinkExt, StreamExt};
use tokio_util::codec::Framed;

use swarmlink::codec::{PacketFrame, WireCodec};
use swarmlink::protocol::encryption::ServerKeyExchange;

#[tokio::test]
async fn plain_frame_roundtrip_over_duplex() {
    let (a, b) = tokio::io::duplex(4096);
    let mut writer = Framed::new(a, WireCodec::default());
    let mut reader = Framed::new(b, WireCodec::default());

    let frame = PacketFrame::new(7, vec![0x01, 0x02, 0x03]);
    writer.send(frame.clone()).await.unwrap();

    let decoded = reader.next().await.unwrap().unwrap();
    assert_eq!(decoded.id, 7);
    assert_eq!(&decoded.payload[..], &[0x01, 0x02, 0x03]);
    assert_eq!(decoded, frame);
}

#[tokio::test]
async fn negotiated_layers_roundtrip_over_duplex() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let mut writer = Framed::new(a, WireCodec::default());
    let mut reader = Framed::new(b, WireCodec::default());

    // Negotiate the same contexts on both ends, the way login does.
    let (exchange, server_public, nonce) = ServerKeyExchange::initiate();
    let (client_public, key) = swarmlink::protocol::encryption::client_respond(server_public, nonce);
    let peer_key = exchange.finalize(client_public);

    writer.codec_mut().enable_compression(128);
    writer.codec_mut().enable_encryption(key);
    reader.codec_mut().enable_compression(128);
    reader.codec_mut().enable_encryption(peer_key);

    // One frame under the threshold, one far over it.
    let small = PacketFrame::new(3, vec![0xAA; 16]);
    let large = PacketFrame::new(4, vec![0xBB; 4096]);
    writer.send(small.clone()).await.unwrap();
    writer.send(large.clone()).await.unwrap();

    assert_eq!(reader.next().await.unwrap().unwrap(), small);
    assert_eq!(reader.next().await.unwrap().unwrap(), large);
}

#[tokio::test]
async fn frames_keep_wire_order_under_pipelined_writes() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let mut writer = Framed::new(a, WireCodec::default());
    let mut reader = Framed::new(b, WireCodec::default());

    for i in 0..200u32 {
        writer
            .send(PacketFrame::new(1, i.to_be_bytes().to_vec()))
            .await
            .unwrap();
    }

    for i in 0..200u32 {
        let frame = reader.next().await.unwrap().unwrap();
        assert_eq!(&frame.payload[..], &i.to_be_bytes());
    }
}
