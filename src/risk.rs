use crate::models::{RiskTier, SurveyMetrics};

/// Suggestions for the dental operator, one line each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorGuidance {
    pub recurring: &'static str,
    pub fluoride: &'static str,
    pub diet: &'static str,
    pub sealant: &'static str,
    pub restorative: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentGuidance {
    pub reminder: &'static [&'static str],
    pub guidance: &'static [&'static str],
    pub supervision: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeacherGuidance {
    pub reminder: &'static [&'static str],
    pub guidance: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierGuidance {
    pub operator: OperatorGuidance,
    pub parent: ParentGuidance,
    pub teacher: TeacherGuidance,
}

/// Guidance text for every tier in one language.
#[derive(Debug)]
pub struct GuidanceTable {
    pub low: TierGuidance,
    pub medium: TierGuidance,
    pub high: TierGuidance,
}

impl GuidanceTable {
    pub fn for_tier(&self, tier: RiskTier) -> &TierGuidance {
        match tier {
            RiskTier::Low => &self.low,
            RiskTier::Medium => &self.medium,
            RiskTier::High => &self.high,
        }
    }
}

pub static INDONESIAN: GuidanceTable = GuidanceTable {
    low: TierGuidance {
        operator: OperatorGuidance {
            recurring: "setiap 6-12 bulan",
            fluoride: "pasta gigi 2x sehari",
            diet: "pemeliharaan asupan diet",
            sealant: "fissure sealant dilakukan jika diperlukan",
            restorative: "pengawasan karies baru",
        },
        parent: ParentGuidance {
            reminder: &["Orang tua mengingatkan agar kontrol ke dokter gigi setiap 6 bulan sekali"],
            guidance: &[
                "Orang tua mengajarkan cara menyikat gigi yang benar",
                "Orang tua mengingatkan agar menyikat gigi 2x sehari dengan pasta gigi ber fluoride",
            ],
            supervision: &[
                "Orang tua memberikan pengawasan terhadap makanan manis dan lengket yang dikonsumsi sehari - hari",
            ],
        },
        teacher: TeacherGuidance {
            reminder: &["Guru mengingatkan agar kontrol ke dokter gigi setiap 6 bulan sekali"],
            guidance: &[
                "Guru mengajarkan cara menyikat gigi yang benar",
                "Guru mengingatkan agar menyikat gigi 2x sehari dengan pasta gigi ber fluoride",
            ],
        },
    },
    medium: TierGuidance {
        operator: OperatorGuidance {
            recurring: "setiap 4-6 bulan",
            fluoride: "pasta gigi 2x sehari + Topikal aplikasi",
            diet: "diet dengan pengawasan",
            sealant: "fissure sealant dilakukan jika diperlukan",
            restorative: "pengawasan karies baru + restorasi dari kavitas baru",
        },
        parent: ParentGuidance {
            reminder: &["Orang tua mengingatkan agar kontrol ke dokter gigi setiap 4-6 bulan sekali"],
            guidance: &[
                "Orang tua mengajarkan cara menyikat gigi yang benar",
                "Orang tua mengingatkan agar menyikat gigi 2x sehari dengan pasta gigi ber fluoride",
                "Orang tua mengingatkan agar dilakukan perawatan topical aplikasi fluoride",
            ],
            supervision: &[
                "Orang tua melakukan diet makanan manis dan lengket yang dikonsumsi sehari- hari",
            ],
        },
        teacher: TeacherGuidance {
            reminder: &["Guru mengingatkan agar kontrol ke dokter gigi setiap 4-6 bulan sekali"],
            guidance: &[
                "Guru mengajarkan cara menyikat gigi yang benar",
                "Guru mengingatkan agar menyikat gigi 2x sehari dengan pasta gigi ber fluoride",
                "Guru mengingatkan agar dilakukan perawatan topical aplikasi fluoride",
            ],
        },
    },
    high: TierGuidance {
        operator: OperatorGuidance {
            recurring: "setiap 3-4 bulan",
            fluoride: "topikal aplikasi + pasta gigi 2x sehari",
            diet: "diet dengan pengawasan + xylitol",
            sealant: "direkomendasikan fissure sealant",
            restorative: "pengawasan karies baru + restorasi dari kavitas baru",
        },
        parent: ParentGuidance {
            reminder: &["Orang tua mengingatkan agar kontrol ke dokter gigi setiap 3-4 bulan sekali"],
            guidance: &[
                "Orang tua mengajarkan cara menyikat gigi yang benar",
                "Orang tua mengingatkan agar menyikat gigi 2x sehari dengan pasta gigi ber fluoride",
                "Orang tua mengingatkan agar dilakukan perawatan topical aplikasi fluoride",
            ],
            supervision: &[
                "Orang tua melakukan diet makanan manis dan lengket yang dikonsumsi sehari- hari",
                "Orang tua mengganti konsumsi permen yang manis dengan permen xylitol",
            ],
        },
        teacher: TeacherGuidance {
            reminder: &["Guru mengingatkan agar kontrol ke dokter gigi setiap 3-4 bulan sekali"],
            guidance: &[
                "Guru mengajarkan cara menyikat gigi yang benar",
                "Guru mengingatkan agar menyikat gigi 2x sehari dengan pasta gigi ber fluoride",
                "Guru mengingatkan agar dilakukan perawatan topical aplikasi fluoride",
            ],
        },
    },
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DmfCounts {
    pub decayed: f64,
    pub missing: f64,
    pub filled: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskAssessment {
    pub tier: RiskTier,
    pub score: f64,
    pub dmf: DmfCounts,
    pub guidance: &'static TierGuidance,
}

/// Maps a subjective score to its tier. NaN falls through to `Low`.
pub fn classify(score: f64) -> RiskTier {
    if score > 66.0 {
        RiskTier::High
    } else if score > 33.0 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

pub fn assess(metrics: &SurveyMetrics, table: &'static GuidanceTable) -> RiskAssessment {
    let tier = classify(metrics.subjective_score);
    RiskAssessment {
        tier,
        score: metrics.subjective_score,
        dmf: DmfCounts {
            decayed: metrics.upper_d,
            missing: metrics.upper_m,
            filled: metrics.upper_f,
        },
        guidance: table.for_tier(tier),
    }
}
