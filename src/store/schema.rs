//! Tantivy schema for the local vector store.
//!
//! One tantivy document per stored record. Only `record_id`, `seq` and
//! `source` are indexed; everything else is stored for retrieval.

use tantivy::schema::{
    FAST, Field, NumericOptions, STORED, STRING, Schema, SchemaBuilder,
};

/// Schema fields for record storage.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    /// Record id returned from `add`.
    pub record_id: Field,

    /// Insertion sequence number, used for stable ordering.
    pub seq: Field,

    /// `metadata.source`, indexed for delete-by-source and filtering.
    pub source: Field,

    /// Chunk text.
    pub content: Field,

    /// Full metadata map as JSON text.
    pub metadata: Field,

    /// Embedding as little-endian f32 bytes.
    pub embedding: Field,

    /// Timestamp when stored (UTC seconds).
    pub indexed_at: Field,
}

impl RecordSchema {
    /// Build the schema for record storage.
    pub fn build() -> (Schema, Self) {
        let mut builder = SchemaBuilder::default();

        let record_id = builder.add_text_field("record_id", STRING | STORED);

        let indexed_u64 = NumericOptions::default()
            .set_indexed()
            .set_stored()
            .set_fast();
        let seq = builder.add_u64_field("seq", indexed_u64);

        let source = builder.add_text_field("source", STRING | STORED | FAST);
        let content = builder.add_text_field("content", STORED);
        let metadata = builder.add_text_field("metadata", STORED);
        let embedding = builder.add_bytes_field("embedding", STORED);
        let indexed_at = builder.add_u64_field("indexed_at", STORED);

        let schema = builder.build();

        let record_schema = Self {
            record_id,
            seq,
            source,
            content,
            metadata,
            embedding,
            indexed_at,
        };

        (schema, record_schema)
    }
}

/// Encode an embedding for the `embedding` bytes field.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

/// Decode an `embedding` bytes field. Trailing partial values are ignored.
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_build() {
        let (schema, _fields) = RecordSchema::build();

        assert!(schema.get_field("record_id").is_ok());
        assert!(schema.get_field("seq").is_ok());
        assert!(schema.get_field("source").is_ok());
        assert!(schema.get_field("content").is_ok());
        assert!(schema.get_field("metadata").is_ok());
        assert!(schema.get_field("embedding").is_ok());
        assert!(schema.get_field("indexed_at").is_ok());

        assert_eq!(schema.fields().count(), 7);
    }

    #[test]
    fn test_embedding_bytes() {
        let vector = vec![0.25f32, -1.5, 3.0e-7];
        let bytes = encode_embedding(&vector);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_embedding(&bytes), vector);
        assert_eq!(decode_embedding(&bytes[..5]), vec![0.25]);
    }
}
