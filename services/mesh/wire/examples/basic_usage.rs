//! Basic usage example for the file-transfer wire format.

use bytes::Bytes;
use mesh_wire::{decode, encode, slice_part, total_parts, ControlMessage, TransferId};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Mesh File-Transfer Wire Example ===\n");

    // 1. Offer a file
    println!("1. Encoding an OFFER...");
    let id = TransferId::generate();
    let offer = ControlMessage::Offer {
        id: id.clone(),
        file_name: "notes.txt".to_string(),
        file_size: 500,
    };
    let encoded = encode(&offer)?;
    println!("   Encoded offer size: {} bytes", encoded.len());

    // 2. Decode it again
    println!("\n2. Decoding the OFFER...");
    let decoded = decode(&encoded)?;
    println!("   Decoded: {:?}", decoded);

    // 3. Slice a payload into parts
    println!("\n3. Slicing a 500 byte payload into 120 byte parts...");
    let payload = Bytes::from(vec![0x42u8; 500]);
    let total = total_parts(payload.len(), 120);
    println!("   Split into {} parts", total);

    for index in 0..total {
        if let Some(data) = slice_part(&payload, index, 120) {
            let part = ControlMessage::FilePart {
                file_transfer_id: id.clone(),
                part_index: index,
                total_parts: total,
                data,
            };
            println!("   Part {} encodes to {} bytes", index, encode(&part)?.len());
        }
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
