use {super::*, core::arch::x86_64::*, core::mem::transmute};

// Sixteen u32 lanes per vector: the whole batch in one pass. AVX-512 has a
// native rotate, so no shift-and-or pairs here.

macro_rules! rotr {
    ($x:expr, $n:literal) => {
        _mm512_ror_epi32::<$n>($x)
    };
}

macro_rules! add {
    ($a:expr, $b:expr) => { _mm512_add_epi32($a, $b) };
    ($a:expr, $b:expr, $($rest:expr),+) => { _mm512_add_epi32($a, add!($b, $($rest),+)) };
}

macro_rules! xor {
    ($a:expr, $b:expr) => { _mm512_xor_si512($a, $b) };
    ($a:expr, $b:expr, $($rest:expr),+) => { _mm512_xor_si512($a, xor!($b, $($rest),+)) };
}

/// Entry bound by `Kernel` only after an avx512f probe succeeds.
pub(super) fn batch(header: &[u8; 80], nonces: &[u32; BATCH], digests: &mut [[u8; 32]; BATCH]) {
    let template = scalar::Template::new(header);
    unsafe { batch16(&template, nonces, digests) }
}

#[target_feature(enable = "avx512f")]
fn broadcast(word: u32) -> __m512i {
    _mm512_set1_epi32(word as i32)
}

#[target_feature(enable = "avx512f")]
fn compress(state: &mut [__m512i; 8], block: &[__m512i; 16]) {
    let mut w = [_mm512_setzero_si512(); 64];
    w[..16].copy_from_slice(block);

    for t in 16..64 {
        let s0 = xor!(
            rotr!(w[t - 15], 7),
            rotr!(w[t - 15], 18),
            _mm512_srli_epi32::<3>(w[t - 15])
        );
        let s1 = xor!(
            rotr!(w[t - 2], 17),
            rotr!(w[t - 2], 19),
            _mm512_srli_epi32::<10>(w[t - 2])
        );
        w[t] = add!(w[t - 16], s0, w[t - 7], s1);
    }

    let [mut a, mut b, mut c, mut d, mut e, mut f, mut g, mut h] = *state;

    for t in 0..64 {
        let s1 = xor!(rotr!(e, 6), rotr!(e, 11), rotr!(e, 25));
        let ch = xor!(_mm512_and_si512(e, f), _mm512_andnot_si512(e, g));
        let t1 = add!(h, s1, ch, broadcast(scalar::K[t]), w[t]);
        let s0 = xor!(rotr!(a, 2), rotr!(a, 13), rotr!(a, 22));
        let maj = xor!(
            _mm512_and_si512(a, b),
            _mm512_and_si512(a, c),
            _mm512_and_si512(b, c)
        );
        let t2 = add!(s0, maj);

        h = g;
        g = f;
        f = e;
        e = add!(d, t1);
        d = c;
        c = b;
        b = a;
        a = add!(t1, t2);
    }

    state[0] = add!(state[0], a);
    state[1] = add!(state[1], b);
    state[2] = add!(state[2], c);
    state[3] = add!(state[3], d);
    state[4] = add!(state[4], e);
    state[5] = add!(state[5], f);
    state[6] = add!(state[6], g);
    state[7] = add!(state[7], h);
}

#[target_feature(enable = "avx512f")]
fn batch16(template: &scalar::Template, nonces: &[u32; BATCH], digests: &mut [[u8; 32]; BATCH]) {
    let mut nonce_words = [0u32; BATCH];
    for (word, nonce) in nonce_words.iter_mut().zip(nonces) {
        *word = nonce.swap_bytes();
    }

    let mut block = [_mm512_setzero_si512(); 16];
    block[0] = broadcast(template.tail[0]);
    block[1] = broadcast(template.tail[1]);
    block[2] = broadcast(template.tail[2]);
    block[3] = unsafe { transmute(nonce_words) };
    block[4] = broadcast(0x8000_0000);
    block[15] = broadcast(640);

    let mut state = [_mm512_setzero_si512(); 8];
    for i in 0..8 {
        state[i] = broadcast(template.midstate[i]);
    }
    compress(&mut state, &block);

    let mut block = [_mm512_setzero_si512(); 16];
    block[..8].copy_from_slice(&state);
    block[8] = broadcast(0x8000_0000);
    block[15] = broadcast(256);

    let mut state = [_mm512_setzero_si512(); 8];
    for i in 0..8 {
        state[i] = broadcast(scalar::IV[i]);
    }
    compress(&mut state, &block);

    for (i, vector) in state.iter().enumerate() {
        let words: [u32; BATCH] = unsafe { transmute(*vector) };
        for lane in 0..BATCH {
            digests[lane][i * 4..i * 4 + 4].copy_from_slice(&words[lane].to_be_bytes());
        }
    }
}
