pub mod memory;
pub mod postgrest;
pub mod repository;
pub mod supabase;

pub use memory::InMemoryStore;
pub use postgrest::SupabaseRepository;
pub use repository::*;
pub use supabase::SupabaseClient;
