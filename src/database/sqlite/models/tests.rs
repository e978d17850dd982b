use super::*;
use chrono::Utc;

#[test]
fn embedding_round_trip() {
    let embedding = vec![0.25_f32, -1.5, 3.75, 0.0, f32::MIN_POSITIVE];
    let bytes = encode_embedding(&embedding);

    assert_eq!(bytes.len(), embedding.len() * 4);
    let decoded = decode_embedding(&bytes).expect("Failed to decode embedding");
    assert_eq!(decoded, embedding);
}

#[test]
fn empty_embedding_round_trip() {
    let bytes = encode_embedding(&[]);
    assert!(bytes.is_empty());
    assert_eq!(
        decode_embedding(&bytes).expect("Failed to decode embedding"),
        Vec::<f32>::new()
    );
}

#[test]
fn truncated_blob_rejected() {
    let mut bytes = encode_embedding(&[1.0, 2.0]);
    bytes.pop();

    assert!(decode_embedding(&bytes).is_err());
}

#[test]
fn chunk_row_conversion() {
    let embedding = vec![0.1_f32, 0.2, 0.3];
    let row = ChunkRow {
        chunk_id: Uuid::new_v4(),
        url_id: Uuid::new_v4(),
        project_id: Uuid::new_v4(),
        content: "some extracted text".to_string(),
        chunk_index: 2,
        embedding: encode_embedding(&embedding),
        created_at: Utc::now().naive_utc(),
    };

    let chunk = Chunk::try_from(row.clone()).expect("Failed to convert row");
    assert_eq!(chunk.chunk_id, row.chunk_id);
    assert_eq!(chunk.chunk_index, 2);
    assert_eq!(chunk.embedding, embedding);
}

#[test]
fn chunk_row_with_corrupt_blob_rejected() {
    let row = ChunkRow {
        chunk_id: Uuid::new_v4(),
        url_id: Uuid::new_v4(),
        project_id: Uuid::new_v4(),
        content: "text".to_string(),
        chunk_index: 0,
        embedding: vec![0u8; 5],
        created_at: Utc::now().naive_utc(),
    };

    assert!(Chunk::try_from(row).is_err());
}

#[test]
fn status_transitions_classified() {
    assert!(UrlStatus::Pending.is_in_flight());
    assert!(UrlStatus::Crawling.is_in_flight());
    assert!(UrlStatus::Encoding.is_in_flight());
    assert!(!UrlStatus::Stored.is_in_flight());
    assert!(!UrlStatus::Failed.is_in_flight());

    assert!(UrlStatus::Stored.is_reprocessable());
    assert!(UrlStatus::Failed.is_reprocessable());
    assert!(!UrlStatus::Encoding.is_reprocessable());
}

#[test]
fn status_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&UrlStatus::Encoding).expect("Failed to serialize"),
        "\"encoding\""
    );
    assert_eq!(UrlStatus::Stored.to_string(), "stored");
}
