use crate::comm::error::CommError;
use crate::comm::types::{MsgType, RequestPayload, ResponsePayload};
use rmp_serde::decode::Deserializer;
use rmp_serde::encode::Serializer;
use serde::Deserialize;
use std::io::Cursor;
use std::result::Result as StdResult;

/// Header size: type (1) + seq (4)
pub const HEADER_LEN: usize = 5;

/// Upper bound on response packet bytes beyond the content string itself
pub const RESPONSE_ENVELOPE_BYTES: usize = 64;

/// Encode a packet with given type, sequence, and payload
pub fn encode_packet(
    msg_type: MsgType,
    seq: u32,
    payload: Option<&impl serde::Serialize>,
) -> StdResult<Vec<u8>, CommError> {
    let mut buf = Vec::new();

    buf.push(msg_type as u8);
    buf.extend_from_slice(&seq.to_be_bytes());

    if let Some(p) = payload {
        // Named fields so the payload survives field reordering
        let mut ser = Serializer::new(&mut buf).with_struct_map();
        p.serialize(&mut ser)
            .map_err(|e| CommError::EncodeError(e.to_string()))?;
    }

    Ok(buf)
}

/// Decode packet type and seq from raw bytes
pub fn decode_header(data: &[u8]) -> StdResult<(MsgType, u32), CommError> {
    if data.len() < HEADER_LEN {
        return Err(CommError::DecodeError("Packet too short".to_string()));
    }

    let msg_type = MsgType::from_u8(data[0])
        .ok_or_else(|| CommError::DecodeError(format!("Unknown msg type: {}", data[0])))?;

    let seq = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((msg_type, seq))
}

/// Decode request payload
pub fn decode_request_payload(data: &[u8]) -> StdResult<RequestPayload, CommError> {
    let mut de = Deserializer::new(Cursor::new(data));
    RequestPayload::deserialize(&mut de).map_err(|e| CommError::DecodeError(e.to_string()))
}

/// Decode response payload
#[allow(dead_code)]
pub fn decode_response_payload(data: &[u8]) -> StdResult<ResponsePayload, CommError> {
    let mut de = Deserializer::new(Cursor::new(data));
    ResponsePayload::deserialize(&mut de).map_err(|e| CommError::DecodeError(e.to_string()))
}

/// Encode request
#[allow(dead_code)]
pub fn encode_request(seq: u32, payload: &RequestPayload) -> StdResult<Vec<u8>, CommError> {
    encode_packet(MsgType::Request, seq, Some(payload))
}

/// Encode request ack (no payload)
pub fn encode_request_ack(seq: u32) -> StdResult<Vec<u8>, CommError> {
    encode_packet(MsgType::RequestAck, seq, None::<&()>)
}

/// Encode response
pub fn encode_response(seq: u32, payload: &ResponsePayload) -> StdResult<Vec<u8>, CommError> {
    encode_packet(MsgType::Response, seq, Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tool: &str, arguments: &str) -> RequestPayload {
        RequestPayload {
            tool: tool.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_request_encode_decode() {
        let payload = request("execute_command", r#"{"command":"ls","args":["-la"]}"#);

        let packet = encode_request(7, &payload).unwrap();
        let (decoded_type, decoded_seq) = decode_header(&packet).unwrap();

        assert_eq!(decoded_type, MsgType::Request);
        assert_eq!(decoded_seq, 7);

        let decoded = decode_request_payload(&packet[HEADER_LEN..]).unwrap();
        assert_eq!(decoded.tool, "execute_command");
        assert_eq!(decoded.arguments, r#"{"command":"ls","args":["-la"]}"#);
    }

    #[test]
    fn test_request_without_arguments_field() {
        #[derive(serde::Serialize)]
        struct ToolOnly<'a> {
            tool: &'a str,
        }

        let packet = encode_packet(MsgType::Request, 1, Some(&ToolOnly { tool: "execution_status" }))
            .unwrap();
        let decoded = decode_request_payload(&packet[HEADER_LEN..]).unwrap();

        assert_eq!(decoded.tool, "execution_status");
        assert!(decoded.arguments.is_empty());
    }

    #[test]
    fn test_request_ack_no_payload() {
        let packet = encode_request_ack(42).unwrap();

        assert_eq!(packet.len(), HEADER_LEN);
        let (msg_type, seq) = decode_header(&packet).unwrap();
        assert_eq!(msg_type, MsgType::RequestAck);
        assert_eq!(seq, 42);
    }

    #[test]
    fn test_response_error_flag() {
        let payload = ResponsePayload {
            content: r#"{"success":false}"#.to_string(),
            is_error: true,
        };

        let packet = encode_response(3, &payload).unwrap();
        let (decoded_type, _) = decode_header(&packet).unwrap();
        assert_eq!(decoded_type, MsgType::Response);

        let decoded = decode_response_payload(&packet[HEADER_LEN..]).unwrap();
        assert!(decoded.is_error);
        assert_eq!(decoded.content, r#"{"success":false}"#);
    }

    #[test]
    fn test_response_envelope_bound() {
        for len in [0, 31, 255, 65_535, 70_000] {
            let payload = ResponsePayload {
                content: "x".repeat(len),
                is_error: true,
            };
            let packet = encode_response(u32::MAX, &payload).unwrap();
            assert!(packet.len() <= len + RESPONSE_ENVELOPE_BYTES, "{len}: {}", packet.len());
        }
    }

    #[test]
    fn test_large_arguments() {
        let code = "x".repeat(60000);
        let payload = request("execute_code", &code);

        let packet = encode_request(1, &payload).unwrap();
        let decoded = decode_request_payload(&packet[HEADER_LEN..]).unwrap();

        assert_eq!(decoded.arguments.len(), 60000);
    }

    #[test]
    fn test_invalid_msg_type() {
        let mut packet = vec![0xFFu8];
        packet.extend_from_slice(&1u32.to_be_bytes());

        let result = decode_header(&packet);
        assert!(matches!(result, Err(CommError::DecodeError(_))));
    }

    #[test]
    fn test_truncated_packet() {
        assert!(decode_header(&[0x01, 0x00, 0x00]).is_err());
        assert!(decode_header(&[0x01, 0x00, 0x00, 0x00, 0x01]).is_ok());
    }

    #[test]
    fn test_seq_is_big_endian() {
        let packet = encode_request_ack(256).unwrap();
        assert_eq!(packet[1..HEADER_LEN].to_vec(), vec![0x00u8, 0x00, 0x01, 0x00]);

        let packet = encode_request_ack(u32::MAX).unwrap();
        let (_, seq) = decode_header(&packet).unwrap();
        assert_eq!(seq, u32::MAX);
    }

    #[test]
    fn test_garbage_payload_is_decode_error() {
        let result = decode_request_payload(&[0xc1, 0x00]);
        assert!(matches!(result, Err(CommError::DecodeError(_))));
    }
}
