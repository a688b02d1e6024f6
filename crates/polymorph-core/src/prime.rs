//! 64-bit primality.
//!
//! Miller-Rabin with the first twelve prime bases is exact for every `u64`,
//! so no randomized rounds are needed.

const BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    (u128::from(a) * u128::from(b) % u128::from(m)) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut acc = 1;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    acc
}

/// Returns true if `n` is prime.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for p in BASES {
        if n % p == 0 {
            return n == p;
        }
    }

    let s = (n - 1).trailing_zeros();
    let d = (n - 1) >> s;

    'witness: for a in BASES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Smallest prime `>= start`, or the largest 64-bit prime if none exists.
pub fn next_prime_u64(start: u64) -> u64 {
    if start <= 2 {
        return 2;
    }

    let mut candidate = start | 1;
    while !is_prime(candidate) {
        match candidate.checked_add(2) {
            Some(next) => candidate = next,
            None => return largest_prime_u64(),
        }
    }
    candidate
}

fn largest_prime_u64() -> u64 {
    let mut candidate = u64::MAX;
    while !is_prime(candidate) {
        candidate -= 2;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values() {
        let primes: Vec<u64> = (0..30).filter(|&n| is_prime(n)).collect();
        assert_eq!(primes, [2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    }

    #[test]
    fn carmichael_numbers_rejected() {
        for n in [561, 1105, 1729, 2465, 2821, 6601, 8911] {
            assert!(!is_prime(n), "{n}");
        }
    }

    #[test]
    fn strong_pseudoprime_to_small_bases_rejected() {
        // Strong pseudoprime to bases 2..=31 but not 37.
        assert!(!is_prime(3_825_123_056_546_413_051));
    }

    #[test]
    fn large_known_primes() {
        assert!(is_prime(18_446_744_073_709_551_557));
        assert!(is_prime(9_223_372_036_854_775_783));
    }

    #[test]
    fn next_prime_scans_upward() {
        assert_eq!(next_prime_u64(0), 2);
        assert_eq!(next_prime_u64(90), 97);
        assert_eq!(next_prime_u64(101), 101);
    }

    #[test]
    fn next_prime_falls_back_below_overflow() {
        assert_eq!(next_prime_u64(u64::MAX - 2), 18_446_744_073_709_551_557);
    }
}
