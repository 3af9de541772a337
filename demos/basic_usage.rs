use queue_adapters::{
    BoundedRing, IdentityIndexedQueue, Lcrq, Session, SpinningSession, ThreadIndexedConfig,
};
use std::thread;
use std::time::Instant;

fn main() {
    println!("queue_adapters example");
    println!("----------------------\n");

    // Configuration
    const PRODUCERS: usize = 1; // Number of producer threads
    const CONSUMERS: usize = 2; // Number of consumer threads
    const N: u32 = 1_000_000; // Each producer pushes this many elements into the queue
    const CAPACITY: usize = 1024; // Queue capacity

    // A bounded ring: any thread may use it, full pushes hand the item back
    let ring = BoundedRing::<u32>::new(CAPACITY).expect("capacity is non-zero");
    println!("Starting {} producers and {} consumers", PRODUCERS, CONSUMERS);
    println!("Each producer will push {} elements", N);
    println!("Queue capacity: {}\n", CAPACITY);

    let start_time = Instant::now();
    let sums: Vec<u64> = thread::scope(|s| {
        let ring = &ring;
        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                s.spawn(move || {
                    let mut local_sum = 0u64;
                    // 0 is the termination signal
                    loop {
                        let n = match ring.pop() {
                            Some(n) => n,
                            None => {
                                std::hint::spin_loop();
                                continue;
                            }
                        };
                        if n == 0 {
                            break;
                        }
                        local_sum += n as u64;
                    }
                    local_sum
                })
            })
            .collect();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                s.spawn(move || {
                    for n in (1..=N).rev() {
                        let mut item = n;
                        while let Err(back) = ring.push(item) {
                            item = back;
                            std::hint::spin_loop();
                        }
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        for _ in 0..CONSUMERS {
            while ring.push(0).is_err() {
                std::hint::spin_loop();
            }
        }
        consumers.into_iter().map(|c| c.join().unwrap()).collect()
    });

    let total_sum: u64 = sums.iter().sum();
    let expected_sum: u64 = (N as u64 * (N as u64 + 1) / 2) * PRODUCERS as u64;
    println!("Execution time: {:?}", start_time.elapsed());
    println!("Total sum: {}", total_sum);
    println!("Expected sum: {}", expected_sum);
    if total_sum != expected_sum {
        println!("ERROR: Sum mismatch! Difference: {}", total_sum as i64 - expected_sum as i64);
    } else {
        println!("SUCCESS: All elements were correctly processed.");
    }
    for (i, &sum) in sums.iter().enumerate() {
        println!("Consumer {}: sum = {}", i, sum);
    }

    // An LCRQ: every thread first claims a thread id, the session gives it back on drop
    println!("\nLCRQ with registered threads");
    let lcrq = Lcrq::<String>::new(ThreadIndexedConfig::new(4)).expect("valid config");
    thread::scope(|s| {
        for _ in 0..3 {
            let lcrq = &lcrq;
            s.spawn(move || {
                let mut session = lcrq.register().expect("a free thread id");
                session.push(format!("hello from thread id {}", session.tid())).unwrap();
            });
        }
    });
    let mut reader = lcrq.register().expect("a free thread id");
    while let Some(msg) = reader.pop() {
        println!("  {}", msg);
    }
    assert_eq!(reader.pop_within(10), None);
}
