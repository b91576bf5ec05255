//! Synthetic frames through the dispatcher, a client endpoint and a real
//! server down to the serial capture.

use std::sync::Arc;
use std::time::Duration;

use image::Rgb;

use ball_hoop_tracker::network::{CaptureBuffer, Client, Endpoint, SerialLine, Server};
use ball_hoop_tracker::pipeline::{FrameDispatcher, MemoryFrameSource};
use ball_hoop_tracker::protocol::{ProtocolCodec, ReservedCode};
use ball_hoop_tracker::vision::{BallDetector, BallSearch, Hoop, HoopSearch, HsvImage, HsvRange};
use ball_hoop_tracker::vision::debug::DebugDump;

const MARKER: [u8; 3] = [30, 200, 200];
const BALL: [u8; 3] = [110, 200, 200];

fn render(discs: &[([i32; 2], i32, [u8; 3])]) -> HsvImage {
    HsvImage::from_fn(200, 200, |x, y| {
        let hit = discs.iter().find(|(c, r, _)| {
            let dx = x as i32 - c[0];
            let dy = y as i32 - c[1];
            dx * dx + dy * dy <= r * r
        });
        Rgb(hit.map_or([0, 0, 0], |(_, _, color)| *color))
    })
}

fn calibrated_hoop() -> Arc<Hoop> {
    let frame = render(&[
        ([180, 100], 4, MARKER),
        ([100, 180], 4, MARKER),
        ([20, 100], 4, MARKER),
    ]);
    let search = HoopSearch {
        hsv: HsvRange::new([25, 150, 150], [35, 255, 255]),
        morph_iterations: 0,
        min_dot_radius: 2,
    };
    let hoop = Hoop::calibrate(&frame, &search, &DebugDump::disabled()).unwrap();
    assert_eq!(hoop.center(), [100, 100]);
    assert_eq!(hoop.radius(), 80);
    Arc::new(hoop)
}

fn ball_search() -> BallSearch {
    BallSearch {
        hsv: HsvRange::new([100, 86, 6], [120, 255, 255]),
        morph_iterations: 1,
        min_radius: 5,
        max_radius: 20,
    }
}

#[test]
fn test_frames_reach_serial_line_in_order() {
    let hoop = calibrated_hoop();
    let codec = ProtocolCodec::new(360, 2, true).unwrap();

    let capture = CaptureBuffer::new();
    let mut server = Server::bind(
        "127.0.0.1:0".parse().unwrap(),
        "pi-server",
        codec,
        SerialLine::with_writer(capture.clone(), 2),
    )
    .unwrap();
    server.start().unwrap();

    let client = Client::connect(server.local_addr(), "pi-left", codec, Duration::from_secs(5)).unwrap();
    let mut endpoint = Endpoint::Client(client);

    let positions = [[100, 150], [65, 135], [135, 135]];
    let mut frames: Vec<HsvImage> = positions.iter().map(|&p| render(&[(p, 10, BALL)])).collect();
    frames.push(render(&[]));
    let mut expected: Vec<u64> = positions
        .iter()
        .map(|&p| codec.encode(hoop.angle_in_hoop(p)).unwrap().value)
        .collect();
    expected.push(codec.code(ReservedCode::NotFound));
    assert_eq!(&expected[..3], &[0, 45, 315]);

    let detector = BallDetector::new(hoop, ball_search());
    let dispatcher = FrameDispatcher::new(1);
    let mut source = MemoryFrameSource::new(frames);
    let stats = dispatcher.run(&mut source, &detector, &mut endpoint).unwrap();
    endpoint.close();

    assert!(source.is_closed());
    assert_eq!(stats.submitted, 4);
    assert_eq!(stats.accepted, 4);
    assert_eq!(stats.not_found, 1);
    assert_eq!(stats.stale, 0);
    assert_eq!(capture.values(2), expected);

    let log = server.log_snapshot();
    let left = log.host("pi-left").unwrap();
    assert_eq!(left.angle, vec![0, 45, 315, 315]);
    assert_eq!(left.error, vec![0, 0, 0, 9]);
    server.stop();
}

#[test]
fn test_parallel_run_delivers_every_frame_once() {
    let hoop = calibrated_hoop();
    let codec = ProtocolCodec::new(360, 2, true).unwrap();
    let capture = CaptureBuffer::new();
    let mut server = Server::bind(
        "127.0.0.1:0".parse().unwrap(),
        "pi-server",
        codec,
        SerialLine::with_writer(capture.clone(), 2),
    )
    .unwrap();
    server.start().unwrap();
    let mut endpoint = Endpoint::Server(server);

    let frames: Vec<HsvImage> = (0..24)
        .map(|i| {
            let x = 60 + (i % 9) * 10;
            render(&[([x, 140], 9, BALL)])
        })
        .collect();
    let detector = BallDetector::new(hoop.clone(), ball_search());
    let dispatcher = FrameDispatcher::new(4);
    let mut source = MemoryFrameSource::new(frames);
    let stats = dispatcher.run(&mut source, &detector, &mut endpoint).unwrap();

    assert_eq!(stats.submitted, 24);
    assert_eq!(stats.accepted + stats.stale, 24);
    assert_eq!(stats.not_found, 0);

    let values = capture.values(2);
    assert_eq!(values.len(), 24);
    let wrong_order = codec.code(ReservedCode::WrongOrder);
    assert_eq!(values.iter().filter(|&&v| v == wrong_order).count() as u64, stats.stale);
    assert!(values.iter().all(|&v| v < 360 || v == wrong_order));
    endpoint.close();
}
