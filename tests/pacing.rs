use framesync::FramePacer;
use std::time::{Duration, Instant};

#[test]
fn holding_thirty_fps_paces_the_loop() {
    let mut pacer = FramePacer::new();
    pacer.hold_fps(30);

    let started = Instant::now();
    for _ in 0..100 {
        pacer.hold_fps(30);
    }
    let period = started.elapsed() / 100;

    let target = Duration::from_secs_f64(1.0 / 30.0);
    let low = target.mul_f64(0.97);
    let high = target.mul_f64(1.05);
    assert!(period >= low && period <= high, "period {:?}", period);
}
