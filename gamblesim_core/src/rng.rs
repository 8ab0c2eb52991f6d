use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

// Deterministic RNG using provably-fair HMAC construction
// server_seed (secret) + client_seed + nonce -> HMAC-SHA256 -> byte stream
// The stream is extended by hashing the previous block once it runs dry.

pub type HmacSha256 = Hmac<Sha256>;

pub fn derive_hash_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Fresh 256-bit secret for a server seed, hex encoded.
pub fn generate_server_seed() -> String {
    hex::encode(rand::thread_rng().gen::<[u8; 32]>())
}

/// Client seed used for one player's spin stream. Session and player ids are
/// both part of it so a reset player counter never replays an older stream.
pub fn player_client_seed(session_id: &str, player_id: &str) -> String {
    format!("{}:{}", session_id, player_id)
}

#[derive(Debug, Clone)]
pub struct ProvablyFairRng {
    pub server_seed: String, // secret
    pub client_seed: String,
    pub nonce: u64,
    block: [u8; 32],
    cursor: usize,
}

impl ProvablyFairRng {
    pub fn new(server_seed: impl Into<String>, client_seed: impl Into<String>, nonce: u64) -> Self {
        let mut rng = Self {
            server_seed: server_seed.into(),
            client_seed: client_seed.into(),
            nonce,
            block: [0u8; 32],
            cursor: 0,
        };
        rng.block = rng.hmac_bytes();
        rng
    }

    pub fn server_seed_hash_hex(&self) -> String {
        derive_hash_hex(self.server_seed.as_bytes())
    }

    pub fn hmac_bytes(&self) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(self.server_seed.as_bytes())
            .expect("HMAC accepts keys of any length");
        let msg = format!("{}:{}", self.client_seed, self.nonce);
        mac.update(msg.as_bytes());
        let res = mac.finalize().into_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(&res);
        out
    }

    fn refill(&mut self) {
        let next = Sha256::digest(self.block);
        self.block.copy_from_slice(&next);
        self.cursor = 0;
    }
}

impl RngCore for ProvablyFairRng {
    fn next_u32(&mut self) -> u32 {
        if self.cursor + 4 > self.block.len() {
            self.refill();
        }
        let chunk = &self.block[self.cursor..self.cursor + 4];
        self.cursor += 4;
        u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.next_u32());
        let lo = u64::from(self.next_u32());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_be_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
