//! Corpus synthesis
//!
//! Every (addressee, scene) pair becomes one request per round. Each request
//! draws a response style, an example line for styles that have them, and an
//! extra hint at random.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::dataset::client::{ChatCompletion, ChatMessage};
use crate::dataset::{CorpusEntry, CorpusItem, DatasetError};
use crate::truncate_str;

pub const SYNTH_SYSTEM_PROMPT: &str = "You are a young person who is good at handling relatives \
who pressure you to get married, answering them cleverly and politely in many different styles.";

/// A response style; `{example}` in the instruction is filled with one of
/// `examples` when there are any.
#[derive(Debug, Clone, Copy)]
pub struct Style {
    pub name: &'static str,
    pub instruction: &'static str,
    pub examples: &'static [&'static str],
}

pub const STYLES: &[Style] = &[
    Style {
        name: "humorous",
        instruction: "Reply to the marriage pressure with witty, playful humor. Example of the tone: {example}",
        examples: &[
            "Relax, I'm currently on a blind date with my future self.",
            "Give me a bit longer, I'm looking for a more fun team leader.",
            "Marriage? Salary target first, then we'll talk!",
        ],
    },
    Style {
        name: "tactful",
        instruction: "Reply to the marriage pressure tactfully and politely, showing understanding and respect.",
        examples: &[],
    },
    Style {
        name: "direct",
        instruction: "Reply to the marriage pressure directly but politely, stating your own view.",
        examples: &[],
    },
    Style {
        name: "evasive",
        instruction: "Reply vaguely and stall, neither refusing outright nor making any promise. \
                      Example of the tone: {example}",
        examples: &[
            "Well, it depends on fate, can't rush these things.",
            "You're right, I'm thinking about it slowly.",
            "Don't worry, I'll think about it when I have time.",
        ],
    },
    Style {
        name: "exasperated",
        instruction: "Reply with exaggerated, over-the-top exasperation that still stays respectful. \
                      Example of the tone: {example}",
        examples: &[
            "This is more exhausting than my job, I'm losing it!",
            "Why is getting married so hard, I almost want to change careers!",
            "All this nagging is making my hair fall out!",
        ],
    },
    Style {
        name: "resigned",
        instruction: "Reply with helpless resignation to reality, with a hint of private regret. \
                      Example of the tone: {example}",
        examples: &[
            "Sigh, I've been nagged into submission, I'll take it slowly.",
            "I'm anxious too, I'll just listen to my parents for now.",
            "There's a lot of pressure at home, I'm just getting by.",
        ],
    },
];

pub const ADDRESSEES: &[&str] = &[
    "father",
    "mother",
    "paternal grandfather",
    "paternal grandmother",
    "maternal grandfather",
    "maternal grandmother",
    "father's elder brother",
    "father's elder brother's wife",
    "father's younger brother",
    "father's younger brother's wife",
    "mother's brother",
    "mother's brother's wife",
    "mother's sister",
    "mother's sister's husband",
    "older cousin",
    "younger cousin",
    "elderly neighbor",
    "head of the family clan",
    "senior relative of a higher generation",
    "parents' friend",
    "older manager at work",
    "distant relative",
];

pub const SCENES: &[&str] = &[
    "a family gathering",
    "the Spring Festival reunion dinner",
    "a Mid-Autumn Festival family video call",
    "the family group chat",
    "in front of everyone at a relatives' gathering",
    "a superior at work bringing it up",
    "being set up on a blind date",
    "traditional pressure from elders in the countryside",
    "grandparents with traditional views on marriage",
    "a casual, caring remark from an elder",
    "friends and family asking during the holidays whether you are seeing anyone",
    "repeated calls and messages from parents",
    "sarcastic remarks from relatives",
    "a forceful relative who will not let it go",
    "a family dinner where the topic cannot be avoided",
    "the New Year's Eve dinner",
    "a close friend of the parents getting familiar",
    "a work dinner with senior colleagues hinting at it",
    "a relative hinting on social media",
    "a heated argument in the family group chat",
    "anxious parents whose worry is stressful",
    "an aunt bringing a matchmaking gift",
    "being told it will soon be too late to marry",
    "an elder repeatedly bringing it up to awkward effect",
    "being asked again and again while visiting for the New Year",
];

pub const EXTRA_HINTS: &[&str] = &[
    "",
    "Show respect and care for the elder in your answer.",
    "Add a little humor to ease the mood.",
    "Avoid being too blunt; defuse it lightly.",
    "Keep the wording short and clear.",
];

const PROMPT_TEMPLATE: &str = "
You are a young person whose {addressee} is pressuring you to get married during {scene}.
Using the following style: {style}
write a short two-line exchange in response.
The first line is what the elder says to push you (imitate a typical line an elder would use),
the second line is your reply, clever and polite, matching the style.
{extra}
Return only these two lines with no other explanation.
";

/// One planned request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthJob {
    pub addressee: &'static str,
    pub scene: &'static str,
    pub style_name: &'static str,
    pub prompt: String,
}

impl SynthJob {
    /// Draws a style, example and hint for one (addressee, scene) pair.
    pub fn draw<R: Rng + ?Sized>(addressee: &'static str, scene: &'static str, rng: &mut R) -> Self {
        let style = STYLES.choose(rng).copied().unwrap_or(STYLES[0]);
        let style_text = match style.examples.choose(rng) {
            Some(example) => style.instruction.replace("{example}", example),
            None => style.instruction.to_string(),
        };
        let extra = EXTRA_HINTS.choose(rng).copied().unwrap_or_default();

        let prompt = PROMPT_TEMPLATE
            .replace("{addressee}", addressee)
            .replace("{scene}", scene)
            .replace("{style}", &style_text)
            .replace("{extra}", extra);

        Self {
            addressee,
            scene,
            style_name: style.name,
            prompt,
        }
    }

    fn messages(&self) -> [ChatMessage; 2] {
        [ChatMessage::system(SYNTH_SYSTEM_PROMPT), ChatMessage::user(&self.prompt)]
    }

    fn into_item(self, output: String) -> CorpusItem {
        CorpusItem {
            conversation: vec![CorpusEntry {
                system: SYNTH_SYSTEM_PROMPT.to_string(),
                input: format!(
                    "Reply to marriage pressure from {}, scene: {}, style: {}",
                    self.addressee, self.scene, self.style_name
                ),
                src_input: Some(self.prompt),
                style_name: Some(self.style_name.to_string()),
                output,
            }],
        }
    }
}

/// Plans `rounds` passes over every addressee and scene.
pub fn plan_jobs<R: Rng + ?Sized>(rounds: usize, rng: &mut R) -> Vec<SynthJob> {
    let mut jobs = Vec::with_capacity(rounds * ADDRESSEES.len() * SCENES.len());
    for _ in 0..rounds {
        for &addressee in ADDRESSEES {
            for &scene in SCENES {
                jobs.push(SynthJob::draw(addressee, scene, rng));
            }
        }
    }
    jobs
}

/// Runs every planned job in order. Failed requests are logged and skipped.
pub async fn synthesize<C: ChatCompletion + ?Sized>(
    client: &C,
    rounds: usize,
    seed: Option<u64>,
) -> Vec<CorpusItem> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let jobs = plan_jobs(rounds, &mut rng);
    let total = jobs.len();
    tracing::info!("Synthesizing {} exchanges over {} round(s)", total, rounds);

    let mut items = Vec::with_capacity(total);
    for job in jobs {
        match client.complete(&job.messages()).await {
            Ok(output) => {
                tracing::info!(
                    addressee = job.addressee,
                    scene = job.scene,
                    style = job.style_name,
                    "Generated {}/{}: {}",
                    items.len() + 1,
                    total,
                    truncate_str(&output, 120)
                );
                items.push(job.into_item(output));
            }
            Err(e) => {
                tracing::warn!(addressee = job.addressee, scene = job.scene, "Generation failed: {}", e);
            }
        }
    }
    items
}

/// Corpus file name stamped with `now`.
pub fn output_file_name(now: DateTime<Local>) -> String {
    format!("marriage_responses_{}.json", now.format("%Y-%m-%d-%H-%M-%S"))
}

/// Writes `items` as pretty JSON into `dir` and returns the file path.
pub fn write_corpus(dir: &Path, items: &[CorpusItem]) -> Result<PathBuf, DatasetError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(output_file_name(Local::now()));
    fs::write(&path, serde_json::to_string_pretty(items)?)?;
    tracing::info!("Wrote {} exchanges to {}", items.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes a numbered reply; every third call fails.
    struct FlakyClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatCompletion for FlakyClient {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DatasetError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(messages[0].role, "system");
            if call % 3 == 2 {
                return Err(DatasetError::EmptyResponse);
            }
            Ok(format!("reply {call}"))
        }
    }

    #[test]
    fn test_plan_covers_every_pair_each_round() {
        let mut rng = StdRng::seed_from_u64(1);
        let jobs = plan_jobs(2, &mut rng);
        assert_eq!(jobs.len(), 2 * ADDRESSEES.len() * SCENES.len());
        assert_eq!(jobs[0].addressee, ADDRESSEES[0]);
        assert_eq!(jobs[1].scene, SCENES[1]);
        for job in &jobs {
            assert!(job.prompt.contains(job.addressee));
            assert!(job.prompt.contains(job.scene));
            assert!(!job.prompt.contains("{example}"));
            assert!(STYLES.iter().any(|s| s.name == job.style_name));
        }
    }

    #[test]
    fn test_same_seed_same_plan() {
        let a = plan_jobs(1, &mut StdRng::seed_from_u64(9));
        let b = plan_jobs(1, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_failed_requests_are_skipped() {
        let client = FlakyClient {
            calls: AtomicUsize::new(0),
        };
        let items = synthesize(&client, 1, Some(3)).await;

        let total = ADDRESSEES.len() * SCENES.len();
        assert_eq!(client.calls.load(Ordering::SeqCst), total);
        assert_eq!(items.len(), total - total / 3);

        let entry = &items[0].conversation[0];
        assert_eq!(entry.output, "reply 0");
        assert_eq!(entry.system, SYNTH_SYSTEM_PROMPT);
        assert!(entry.src_input.is_some());
        assert!(entry.input.contains(ADDRESSEES[0]));
    }

    #[test]
    fn test_output_file_name_and_write() {
        let now = Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(output_file_name(now), "marriage_responses_2024-05-06-07-08-09.json");

        let dir = tempfile::TempDir::new().unwrap();
        let item = SynthJob::draw(ADDRESSEES[0], SCENES[0], &mut StdRng::seed_from_u64(0)).into_item("ok".into());
        let path = write_corpus(dir.path(), &[item.clone()]).unwrap();

        let loaded: Vec<CorpusItem> = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded, vec![item]);
    }
}
