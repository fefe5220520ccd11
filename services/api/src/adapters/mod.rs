pub mod db;
pub mod gemini_llm;
pub mod supabase;
pub mod supabase_auth;
pub mod supabase_storage;

pub use db::DbAdapter;
pub use gemini_llm::GeminiTextAdapter;
pub use supabase::SupabaseEndpoint;
pub use supabase_auth::SupabaseAuthAdapter;
pub use supabase_storage::SupabaseStorageAdapter;
