use pioneer_link::protocol::*;

fn v1_sample() -> Record {
    Record::V1Telemetry(V1Telemetry {
        battery_level: 87,
        camera_tilt: -30,
        pitch: -120,
        roll: 45,
        yaw: 27000,
        depth: 350,
        water_temp: 1180,
        health_counter: 4242,
    })
}

fn v2_sample() -> Record {
    Record::V2Telemetry(V2Telemetry {
        battery_level: 64,
        gps_status: 1,
        pitch: 10,
        roll: -10,
        yaw: 9000,
        depth: -2500,
        water_temp: 1200,
        drone_temp: 3300,
        auto_heading: 1,
        auto_depth: 0,
        lights: 50,
        camera_tilt: 12,
    })
}

fn compass_sample(progress: u8) -> Record {
    Record::CompassCalibration(CompassCalibration {
        progress_xy: progress,
        progress_z: progress,
        progress_thruster: progress,
        calibration_state: 1,
        quality: 900,
    })
}

#[test]
fn test_opcode_table() {
    assert_eq!(Opcode::from_code(0x0101), Some(Opcode::V1Telemetry));
    assert_eq!(Opcode::from_code(0x0201), Some(Opcode::V2Telemetry));
    assert_eq!(Opcode::from_code(0x0202), Some(Opcode::CompassCalibration));
    assert_eq!(Opcode::from_code(0x0000), None);
    assert_eq!(Opcode::from_code(0x0102), None);

    assert_eq!(Opcode::V1Telemetry.required_len(), V1_TELEMETRY_LEN);
    assert_eq!(Opcode::V2Telemetry.required_len(), V2_TELEMETRY_LEN);
    assert_eq!(Opcode::CompassCalibration.required_len(), COMPASS_CALIBRATION_LEN);
}

#[test]
fn test_decode_v1_field_layout() {
    // Hand-built frame, big-endian fields after the opcode
    let frame: [u8; 16] = [
        0x01, 0x01, // opcode
        87,   // battery
        0xE2, // camera tilt -30
        0xFF, 0x88, // pitch -120
        0x00, 0x2D, // roll 45
        0x69, 0x78, // yaw 27000
        0x01, 0x5E, // depth 350
        0x04, 0x9C, // water temp 1180
        0x10, 0x92, // health counter 4242
    ];

    let (record, consumed) = decode(&frame, 0).unwrap().unwrap();
    assert_eq!(consumed, 16);
    assert_eq!(record, v1_sample());
}

#[test]
fn test_decode_v2_signed_depth() {
    let bytes = v2_sample().to_bytes();
    assert_eq!(bytes.len(), V2_TELEMETRY_LEN);
    assert_eq!(&bytes[..2], &[0x02, 0x01]);

    let (record, consumed) = decode(&bytes, 0).unwrap().unwrap();
    assert_eq!(consumed, V2_TELEMETRY_LEN);
    match record {
        Record::V2Telemetry(msg) => assert_eq!(msg.depth, -2500),
        other => panic!("unexpected record {:?}", other),
    }
}

#[test]
fn test_short_buffer_consumes_nothing() {
    for sample in [v1_sample(), v2_sample(), compass_sample(50)] {
        let bytes = sample.to_bytes();

        // Every truncation that still carries the opcode is a short frame
        for len in OPCODE_SIZE..bytes.len() {
            match decode(&bytes[..len], 0) {
                Err(DecodeError::ShortFrame { opcode, required, available }) => {
                    assert_eq!(opcode, sample.opcode());
                    assert_eq!(required, bytes.len());
                    assert_eq!(available, len);
                }
                other => panic!("len {} of {}: unexpected {:?}", len, sample.opcode(), other),
            }
        }
    }
}

#[test]
fn test_unrecognized_and_tiny_windows() {
    // Unknown opcode
    assert_eq!(decode(&[0xAB, 0xCD, 0x00, 0x00], 0).unwrap(), None);

    // Zero and one byte windows cannot hold an opcode
    assert_eq!(decode(&[], 0).unwrap(), None);
    assert_eq!(decode(&[0x01], 0).unwrap(), None);

    // Offsets at or past the end never index out of bounds
    let bytes = v1_sample().to_bytes();
    assert_eq!(decode(&bytes, bytes.len()).unwrap(), None);
    assert_eq!(decode(&bytes, bytes.len() + 10).unwrap(), None);
    assert_eq!(decode(&bytes, bytes.len() - 1).unwrap(), None);
}

#[test]
fn test_decode_at_offset() {
    let mut buf = vec![0xEE, 0xEE, 0xEE];
    buf.extend_from_slice(&compass_sample(75).to_bytes());

    assert_eq!(decode(&buf, 0).unwrap(), None);
    let (record, consumed) = decode(&buf, 3).unwrap().unwrap();
    assert_eq!(consumed, COMPASS_CALIBRATION_LEN);
    assert_eq!(record, compass_sample(75));
}

#[test]
fn test_scanner_two_consecutive_frames() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&v1_sample().to_bytes());
    buf.extend_from_slice(&v2_sample().to_bytes());

    let mut scanner = FrameScanner::new(&buf);
    let records: Vec<Record> = scanner.by_ref().collect();

    assert_eq!(records, vec![v1_sample(), v2_sample()]);
    assert_eq!(scanner.offset(), V1_TELEMETRY_LEN + V2_TELEMETRY_LEN);
    assert_eq!(scanner.skipped(), 0);
    assert!(scanner.incomplete().is_none());
    assert!(scanner.tail().is_empty());
}

#[test]
fn test_scanner_resyncs_one_byte_at_a_time() {
    // Junk whose byte pairs never form a known opcode
    let mut buf = vec![0x55, 0xAA, 0x01];
    buf.extend_from_slice(&compass_sample(10).to_bytes());
    buf.extend_from_slice(&[0x77, 0x88]);

    let mut scanner = FrameScanner::new(&buf);
    let records: Vec<Record> = scanner.by_ref().collect();

    assert_eq!(records, vec![compass_sample(10)]);
    // 0x77 is skipped; 0x88 alone cannot hold an opcode and stays as tail
    assert_eq!(scanner.skipped(), 4);
    assert_eq!(scanner.offset(), buf.len() - 1);
    assert_eq!(scanner.tail(), &[0x88]);
}

#[test]
fn test_scanner_keeps_short_tail() {
    let full = v2_sample().to_bytes();
    let mut buf = Vec::new();
    buf.extend_from_slice(&v1_sample().to_bytes());
    buf.extend_from_slice(&full[..10]);

    let mut scanner = FrameScanner::new(&buf);
    let records: Vec<Record> = scanner.by_ref().collect();

    assert_eq!(records, vec![v1_sample()]);
    assert_eq!(scanner.offset(), V1_TELEMETRY_LEN);
    assert_eq!(scanner.tail(), &full[..10]);
    assert!(matches!(scanner.incomplete(), Some(DecodeError::ShortFrame { .. })));

    // The scan stays stopped
    assert_eq!(scanner.next(), None);

    // Completing the tail yields the record
    let mut carried = scanner.tail().to_vec();
    carried.extend_from_slice(&full[10..]);
    let records: Vec<Record> = FrameScanner::new(&carried).collect();
    assert_eq!(records, vec![v2_sample()]);
}

#[test]
fn test_scanner_keeps_lone_trailing_byte() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&compass_sample(1).to_bytes());
    buf.push(0x02);

    let mut scanner = FrameScanner::new(&buf);
    assert_eq!(scanner.by_ref().count(), 1);
    assert_eq!(scanner.tail(), &[0x02]);
    assert!(scanner.incomplete().is_none());
}

#[test]
fn test_scanner_handles_arbitrary_bytes() {
    // Deterministic pseudo-random garbage must never panic or over-consume
    let mut state: u32 = 0x1234_5678;
    let mut buf = Vec::with_capacity(RX_BUFFER_SIZE);
    for _ in 0..RX_BUFFER_SIZE {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        buf.push((state & 0xFF) as u8);
    }

    let mut scanner = FrameScanner::new(&buf);
    let decoded = scanner.by_ref().count();
    assert!(scanner.offset() <= buf.len());
    assert!(decoded <= buf.len() / COMPASS_CALIBRATION_LEN);
}

#[test]
fn test_encode_into_small_buffer_fails() {
    let mut out = [0u8; 4];
    assert!(matches!(
        v1_sample().encode(&mut out),
        Err(DecodeError::ShortFrame { required: 16, available: 4, .. })
    ));
}

#[test]
fn test_compass_overall_progress_is_slowest_axis() {
    let msg = CompassCalibration {
        progress_xy: 90,
        progress_z: 40,
        progress_thruster: 70,
        calibration_state: 1,
        quality: 0,
    };
    assert_eq!(msg.overall_progress(), 40);
}
