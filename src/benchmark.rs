use super::*;

const MEASURE: Duration = Duration::from_secs(2);
const BATCHES_PER_CHECK: u64 = 256;

/// Times every kernel variant the host can run and prints MH/s.
pub fn run() -> Result {
    let detected = Kernel::detect();
    println!("detected kernel variant: {}", detected.variant());

    for variant in [
        kernel::Variant::Scalar,
        kernel::Variant::W8,
        kernel::Variant::W16,
    ] {
        match Kernel::with_variant(variant) {
            Some(kernel) => {
                let rate = measure(&kernel);
                println!("{variant}: {:.2} MH/s ({rate})", rate.mega());
            }
            None => println!("{variant}: unavailable on this host"),
        }
    }

    Ok(())
}

fn measure(kernel: &Kernel) -> HashRate {
    let mut header = [0u8; 80];
    for (i, byte) in header.iter_mut().enumerate() {
        *byte = i as u8;
    }

    let mut digests = [[0u8; 32]; kernel::BATCH];
    let mut nonce = 0u32;
    let mut hashes = 0u64;

    let start = Instant::now();

    while start.elapsed() < MEASURE {
        for _ in 0..BATCHES_PER_CHECK {
            let nonces: [u32; kernel::BATCH] =
                std::array::from_fn(|lane| nonce.wrapping_add(lane as u32));

            kernel.sha256d_batch(&header, &nonces, &mut digests);
            std::hint::black_box(&digests);

            nonce = nonce.wrapping_add(kernel::BATCH as u32);
        }

        hashes += BATCHES_PER_CHECK * kernel::BATCH as u64;
    }

    HashRate::from_hashes(hashes, start.elapsed())
}
