/// Database models for the e-learning platform
///
/// Each module owns one table (or a small family of tables) and exposes its
/// CRUD operations as associated functions taking a pool or executor.
///
/// # Models
///
/// - `user`: accounts and the `Role` sum type
/// - `course`: courses and their publication lifecycle
/// - `lesson`: Markdown lessons of a course
/// - `enrollment`: student ↔ course links and their payment state
/// - `payment`: gateway transactions
/// - `lesson_progress`: lesson completions
/// - `quiz`: quizzes, questions, choices and attempts
/// - `assignment`: assignments and graded submissions
/// - `certificate`: issued certificates and their PDFs
/// - `feedback`: student ratings of a course
/// - `attendance`: per-session attendance register

pub mod assignment;
pub mod attendance;
pub mod certificate;
pub mod course;
pub mod enrollment;
pub mod feedback;
pub mod lesson;
pub mod lesson_progress;
pub mod payment;
pub mod quiz;
pub mod user;
