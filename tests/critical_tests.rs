//! Critical section tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rust_split_steno::critical::{self, Shared};
use rust_split_steno::sys;

struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

/// Read, dawdle, write back: loses updates unless the section excludes.
fn slow_increment(counter: &Shared<u64>, rng: &mut XorShift) {
    let token = critical::acquire();
    let value = counter.get_in(&token);
    for _ in 0..(rng.next() % 64) {
        std::hint::spin_loop();
    }
    if rng.next() % 8 == 0 {
        thread::yield_now();
    }
    counter.set_in(&token, value + 1);
    critical::release(token);
}

#[test]
fn test_isr_and_thread_increments_are_not_lost() {
    const ROUNDS: u64 = 20_000;
    static COUNTER: Shared<u64> = Shared::new(0);

    let start = Arc::new(AtomicBool::new(false));

    let isr_start = Arc::clone(&start);
    let isr = thread::spawn(move || {
        let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
        while !isr_start.load(Ordering::Acquire) {}
        for _ in 0..ROUNDS {
            sys::simulate_isr(|| slow_increment(&COUNTER, &mut rng));
        }
    });

    let worker_start = Arc::clone(&start);
    let worker = thread::spawn(move || {
        let mut rng = XorShift(0x2545_f491_4f6c_dd1d);
        while !worker_start.load(Ordering::Acquire) {}
        for _ in 0..ROUNDS {
            slow_increment(&COUNTER, &mut rng);
        }
    });

    start.store(true, Ordering::Release);
    isr.join().unwrap();
    worker.join().unwrap();

    assert_eq!(COUNTER.get(), 2 * ROUNDS);
}

#[test]
fn test_update_is_atomic() {
    static FLAGS: Shared<u32> = Shared::new(0);

    let handles: Vec<_> = (0..4)
        .map(|_| thread::spawn(|| {
            for _ in 0..1000 {
                FLAGS.update(|v| v + 1);
            }
        }))
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(FLAGS.get(), 4000);
}
