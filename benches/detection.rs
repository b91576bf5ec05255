use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::Rgb;

use ball_hoop_tracker::protocol::ProtocolCodec;
use ball_hoop_tracker::vision::debug::DebugDump;
use ball_hoop_tracker::vision::{find_ball, BallSearch, Hoop, HsvImage, HsvRange};

fn frame(width: u32, height: u32, ball: [i32; 2], radius: i32) -> HsvImage {
    HsvImage::from_fn(width, height, |x, y| {
        let dx = x as i32 - ball[0];
        let dy = y as i32 - ball[1];
        if dx * dx + dy * dy <= radius * radius {
            Rgb([110, 200, 200])
        } else if (x + y) % 17 == 0 {
            // sparse noise in the ball's hue but too dark to match
            Rgb([110, 200, 3])
        } else {
            Rgb([60, 40, 90])
        }
    })
}

fn bench_detection(c: &mut Criterion) {
    let hoop = Arc::new(
        Hoop::new([320, 240], 200, vec![[520, 240], [320, 440], [120, 240]], vec![4, 4, 4]).unwrap(),
    );
    let search = BallSearch {
        hsv: HsvRange::new([100, 86, 6], [120, 255, 255]),
        morph_iterations: 1,
        min_radius: 5,
        max_radius: 20,
    };
    let debug = DebugDump::disabled();
    let frame = frame(640, 480, [260, 380], 15);

    c.bench_function("find_ball_640x480", |b| {
        b.iter(|| find_ball(black_box(&frame), &search, &hoop, &debug))
    });

    c.bench_function("sector_mask_640x480", |b| b.iter(|| hoop.sector_mask(black_box(640), 480)));

    let codec = ProtocolCodec::default();
    c.bench_function("encode_angle", |b| b.iter(|| codec.encode(black_box(-123.4))));
}

criterion_group!(benches, bench_detection);
criterion_main!(benches);
