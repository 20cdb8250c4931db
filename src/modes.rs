// The closed set of conversational presets. The string names returned by `name()`
// are what gets stored in the persisted search history, so they must stay stable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    Tutor,
    Exam,
    Osce,
    NmcCbt,
    Nclex,
    Oet,
    Ielts,
    Jobs,
    Career,
}

const CLINICAL_FIELD_SUB_MODES: [SubMode; 5] = [
    SubMode::Adult,
    SubMode::Mental,
    SubMode::Midwife,
    SubMode::Pediatrics,
    SubMode::LearningDisability,
];

const CAREER_SUB_MODES: [SubMode; 4] = [
    SubMode::InterviewPrep,
    SubMode::ResumeBuilder,
    SubMode::CpdPlanning,
    SubMode::Specialization,
];

impl Mode {
    pub const ALL: [Mode; 9] = [
        Mode::Tutor,
        Mode::Exam,
        Mode::Osce,
        Mode::NmcCbt,
        Mode::Nclex,
        Mode::Oet,
        Mode::Ielts,
        Mode::Jobs,
        Mode::Career,
    ];

    // the stable identifier for the mode
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Tutor => "Tutor",
            Mode::Exam => "Exam",
            Mode::Osce => "OSCE",
            Mode::NmcCbt => "NMC_CBT",
            Mode::Nclex => "NCLEX",
            Mode::Oet => "OET",
            Mode::Ielts => "IELTS",
            Mode::Jobs => "Jobs",
            Mode::Career => "Career",
        }
    }

    // the user-facing label shown in the mode selector
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Tutor => "AI Tutor",
            Mode::Exam => "Exam Sim",
            Mode::Osce => "OSCE Sim",
            Mode::NmcCbt => "NMC CBT",
            Mode::Nclex => "NCLEX",
            Mode::Oet => "OET Prep",
            Mode::Ielts => "IELTS Prep",
            Mode::Jobs => "Job List",
            Mode::Career => "Career Dev",
        }
    }

    // Parses a mode from either its identifier or its label, ignoring case.
    // Anything unrecognized resolves to the Tutor preset.
    pub fn from_name(name: &str) -> Mode {
        let name = name.trim();
        Mode::ALL
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(name) || m.label().eq_ignore_ascii_case(name))
            .copied()
            .unwrap_or_default()
    }

    // the sub-modes that refine this mode; empty when the mode has none
    pub fn sub_modes(&self) -> &'static [SubMode] {
        match self {
            Mode::Osce | Mode::NmcCbt => &CLINICAL_FIELD_SUB_MODES,
            Mode::Career => &CAREER_SUB_MODES,
            _ => &[],
        }
    }

    // true if the sub-mode is one of the refinements of this mode
    pub fn accepts_sub_mode(&self, sub_mode: SubMode) -> bool {
        self.sub_modes().contains(&sub_mode)
    }

    // the roleplay mode that opens with a generated scenario video
    pub fn is_clinical_simulation(&self) -> bool {
        *self == Mode::Osce
    }

    // modes where replies can be read aloud
    pub fn supports_audio(&self) -> bool {
        matches!(self, Mode::Osce | Mode::Oet | Mode::Ielts)
    }
}
impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubMode {
    Adult,
    Mental,
    Midwife,
    Pediatrics,
    LearningDisability,
    InterviewPrep,
    ResumeBuilder,
    CpdPlanning,
    Specialization,
}
impl SubMode {
    pub fn label(&self) -> &'static str {
        match self {
            SubMode::Adult => "Adult",
            SubMode::Mental => "Mental",
            SubMode::Midwife => "Midwife",
            SubMode::Pediatrics => "Pediatrics",
            SubMode::LearningDisability => "Learning Disability",
            SubMode::InterviewPrep => "Interview Prep",
            SubMode::ResumeBuilder => "Resume Builder",
            SubMode::CpdPlanning => "CPD Planning",
            SubMode::Specialization => "Specialization",
        }
    }

    pub fn from_label(label: &str) -> Option<SubMode> {
        let label = label.trim();
        CLINICAL_FIELD_SUB_MODES
            .iter()
            .chain(CAREER_SUB_MODES.iter())
            .find(|s| s.label().eq_ignore_ascii_case(label))
            .copied()
    }

    // how the sub-mode reads inside a prompt sentence
    fn prompt_phrase(&self) -> &'static str {
        match self {
            SubMode::Adult => "adult nursing",
            SubMode::Mental => "mental health nursing",
            SubMode::Midwife => "midwifery",
            SubMode::Pediatrics => "pediatric (children's) nursing",
            SubMode::LearningDisability => "learning disability nursing",
            SubMode::InterviewPrep => "interview preparation",
            SubMode::ResumeBuilder => "résumé building",
            SubMode::CpdPlanning => "continuing professional development planning",
            SubMode::Specialization => "choosing a clinical specialization",
        }
    }
}
impl std::fmt::Display for SubMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// Tools that can be declared to the remote model for a mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolDeclaration {
    GoogleSearch,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModeConfig {
    pub system_prompt: String,
    pub welcome_message: String,
    pub tools: Option<ToolDeclaration>,
}

const SAFETY_GUARDRAILS: &str = "You must not provide any prescriptive clinical instructions or medical advice. \
All your guidance should be educational and theoretical. Always encourage students to consult with their clinical \
instructors, supervisors, and preceptors for real-world patient care decisions.";

// Resolves the system prompt, welcome message and tools for a mode and optional sub-mode.
// Sub-modes that don't belong to the mode are treated as if none was chosen, which selects
// the mode's general phrasing.
pub fn resolve_mode_config(mode: Mode, sub_mode: Option<SubMode>) -> ModeConfig {
    let sub_mode = sub_mode.filter(|s| mode.accepts_sub_mode(*s));

    match mode {
        Mode::Exam => ModeConfig {
            system_prompt: format!(
                "You are an exam simulator for African student nurses. When the user names a topic, ask exactly one \
                 multiple-choice question about it with four options labelled A to D, then wait for their answer. \
                 After they answer, say whether it was correct, explain the rationale briefly, and offer the next question. \
                 Never reveal the answer before the student responds. {SAFETY_GUARDRAILS}"
            ),
            welcome_message: "Welcome to the Exam Simulator! Tell me a topic (for example \"pharmacology\" or \
                              \"infection control\") and I'll quiz you one question at a time."
                .to_owned(),
            tools: None,
        },
        Mode::Osce => {
            let field = sub_mode.map_or("general nursing", |s| s.prompt_phrase());
            ModeConfig {
                system_prompt: format!(
                    "You are running an OSCE (Objective Structured Clinical Examination) simulation for a student nurse \
                     in the field of {field}. The student describes the station or scenario they want to practise. Roleplay \
                     the patient (and relatives where relevant) realistically, staying in character and answering only \
                     what the student asks. When the student types \"end station\", step out of character and give \
                     structured feedback on communication, assessment, safety and professionalism. {SAFETY_GUARDRAILS}"
                ),
                welcome_message: format!(
                    "Welcome to the OSCE Simulator ({field}). Describe the station you'd like to practise, for example \
                     \"a 65-year-old man with chest pain\", and I'll play the patient. Type \"end station\" for feedback."
                ),
                tools: None,
            }
        }
        Mode::NmcCbt => {
            let field = sub_mode.map_or("general nursing", |s| s.prompt_phrase());
            ModeConfig {
                system_prompt: format!(
                    "You are a tutor preparing internationally educated nurses for the UK NMC Computer Based Test (CBT), \
                     focusing on {field}. Ask one CBT-style question at a time in the style of the real test, wait for \
                     the answer, then explain the correct option with reference to the NMC Code and UK practice. \
                     {SAFETY_GUARDRAILS}"
                ),
                welcome_message: format!(
                    "Welcome to NMC CBT practice ({field}). Ready for your first question? Say \"start\" or name a topic."
                ),
                tools: None,
            }
        }
        Mode::Nclex => ModeConfig {
            system_prompt: format!(
                "You are an NCLEX-RN preparation coach. Ask NCLEX-style questions (including select-all-that-apply and \
                 prioritization items), one at a time, and after each answer explain the rationale and the test-taking \
                 strategy behind it. {SAFETY_GUARDRAILS}"
            ),
            welcome_message: "Welcome to NCLEX prep! Name a client-needs category or topic and we'll work through \
                              questions together."
                .to_owned(),
            tools: None,
        },
        Mode::Oet => ModeConfig {
            system_prompt: "You are an OET (Occupational English Test) tutor for nurses. Help the user practise the \
                            listening, reading, writing (referral letters) and speaking (patient roleplay) sub-tests. \
                            Correct grammar and vocabulary gently, give band-style feedback, and model clear, \
                            patient-centred English."
                .to_owned(),
            welcome_message: "Welcome to OET prep! Would you like to practise a speaking roleplay, a referral letter, \
                              or reading and listening skills?"
                .to_owned(),
            tools: None,
        },
        Mode::Ielts => ModeConfig {
            system_prompt: "You are an IELTS Academic tutor for nurses planning to work abroad. Help the user \
                            practise speaking, writing task 1 and task 2, reading and listening. Give feedback using \
                            the IELTS band descriptors and suggest concrete improvements."
                .to_owned(),
            welcome_message: "Welcome to IELTS prep! Which skill would you like to work on today: speaking, writing, \
                              reading or listening?"
                .to_owned(),
            tools: None,
        },
        Mode::Jobs => ModeConfig {
            system_prompt: "You help nurses find current job openings. Use Google Search to find real, recent \
                            nursing vacancies matching the user's request (location, specialty, grade, visa \
                            sponsorship). List each job with the employer, location, and a short summary. Only list \
                            roles you found in search results."
                .to_owned(),
            welcome_message: "Welcome to the Job List! Tell me what kind of nursing role and location you're \
                              looking for, and I'll search for current openings."
                .to_owned(),
            tools: Some(ToolDeclaration::GoogleSearch),
        },
        Mode::Career => {
            let focus = sub_mode.map_or("general career development", |s| s.prompt_phrase());
            let mut system_prompt = format!(
                "You are a career development coach for African nurses, currently focusing on {focus}. Give practical, \
                 encouraging and specific guidance, asking clarifying questions when you need more detail."
            );
            if sub_mode == Some(SubMode::ResumeBuilder) {
                system_prompt.push_str(
                    " Interview the user step by step for their details (contact, registration, education, clinical \
                     experience, skills). Whenever you present the résumé, put the complete current draft inside a \
                     single ```markdown fenced code block so it can be saved.",
                );
            }
            ModeConfig {
                system_prompt,
                welcome_message: format!(
                    "Welcome to Career Development ({focus}). Tell me where you are in your career and what you'd \
                     like help with."
                ),
                tools: None,
            }
        }
        // the default configuration, also reached for any unrecognized mode name
        Mode::Tutor => ModeConfig {
            system_prompt: format!(
                "You are an AI Tutor for African student nurses. Your goal is to explain nursing concepts clearly and \
                 concisely. {SAFETY_GUARDRAILS} Frame your answers to be supportive, encouraging, and culturally \
                 relevant to the African context where appropriate."
            ),
            welcome_message: "Hello! I'm your AI Nursing Tutor. How can I help you with your studies today? Feel \
                              free to ask me about nursing concepts, patient care theory, or exam preparation."
                .to_owned(),
            tools: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_and_sub_mode_pair_resolves_to_non_empty_text() {
        for mode in Mode::ALL {
            let mut choices: Vec<Option<SubMode>> = vec![None];
            choices.extend(mode.sub_modes().iter().map(|s| Some(*s)));
            for sub_mode in choices {
                let cfg = resolve_mode_config(mode, sub_mode);
                assert!(!cfg.system_prompt.trim().is_empty(), "{mode:?}/{sub_mode:?}");
                assert!(!cfg.welcome_message.trim().is_empty(), "{mode:?}/{sub_mode:?}");
            }
        }
    }

    #[test]
    fn foreign_sub_mode_uses_general_phrasing() {
        let general = resolve_mode_config(Mode::Osce, None);
        let foreign = resolve_mode_config(Mode::Osce, Some(SubMode::ResumeBuilder));
        assert_eq!(general, foreign);
        assert!(general.system_prompt.contains("general nursing"));

        let career = resolve_mode_config(Mode::Career, Some(SubMode::Midwife));
        assert!(career.system_prompt.contains("general career development"));
    }

    #[test]
    fn sub_mode_changes_the_prompt() {
        let adult = resolve_mode_config(Mode::NmcCbt, Some(SubMode::Adult));
        let mental = resolve_mode_config(Mode::NmcCbt, Some(SubMode::Mental));
        assert_ne!(adult.system_prompt, mental.system_prompt);
        assert!(mental.system_prompt.contains("mental health nursing"));
    }

    #[test]
    fn only_jobs_declares_search() {
        for mode in Mode::ALL {
            let cfg = resolve_mode_config(mode, None);
            if mode == Mode::Jobs {
                assert_eq!(cfg.tools, Some(ToolDeclaration::GoogleSearch));
            } else {
                assert_eq!(cfg.tools, None);
            }
        }
    }

    #[test]
    fn resume_builder_asks_for_fenced_drafts() {
        let cfg = resolve_mode_config(Mode::Career, Some(SubMode::ResumeBuilder));
        assert!(cfg.system_prompt.contains("```markdown"));
    }

    #[test]
    fn unknown_mode_names_fall_back_to_tutor() {
        assert_eq!(Mode::from_name("not-a-mode"), Mode::Tutor);
        assert_eq!(Mode::from_name(""), Mode::Tutor);
        assert_eq!(Mode::from_name("osce"), Mode::Osce);
        assert_eq!(Mode::from_name("NMC_CBT"), Mode::NmcCbt);
        assert_eq!(Mode::from_name("Job List"), Mode::Jobs);
    }

    #[test]
    fn mode_names_are_distinct_and_parse_back() {
        for mode in Mode::ALL {
            assert_eq!(Mode::from_name(mode.name()), mode);
            assert_eq!(Mode::ALL.iter().filter(|m| m.name() == mode.name()).count(), 1);
        }
    }

    #[test]
    fn sub_mode_labels_round_trip() {
        for mode in Mode::ALL {
            for sub in mode.sub_modes() {
                assert_eq!(SubMode::from_label(sub.label()), Some(*sub));
            }
        }
        assert_eq!(SubMode::from_label("resume builder"), Some(SubMode::ResumeBuilder));
        assert_eq!(SubMode::from_label("nope"), None);
    }
}
