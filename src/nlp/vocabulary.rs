//! Medical vocabulary tables backing entity extraction.

/// Multi-word clinical terms matched first and preserved atomically.
pub(crate) const COMPOUND_CONDITIONS: &[&str] = &[
    "triple-negative breast cancer",
    "estrogen receptor positive breast cancer",
    "her2 positive breast cancer",
    "her2 negative breast cancer",
    "non-small cell lung cancer",
    "small cell lung cancer",
    "stage 3 non-small cell lung cancer",
    "stage 4 breast cancer",
    "metastatic breast cancer",
    "metastatic colorectal cancer",
    "colorectal cancer",
    "colon cancer",
    "rectal cancer",
    "castration-resistant prostate cancer",
    "acute myeloid leukemia",
    "chronic lymphocytic leukemia",
    "stage 1 breast cancer",
    "stage 2 breast cancer",
    "stage 3 breast cancer",
    "locally advanced breast cancer",
    "type 1 diabetes mellitus",
    "type 2 diabetes mellitus",
    "gestational diabetes",
    "chronic kidney disease",
    "end stage renal disease",
    "coronary artery disease",
    "peripheral artery disease",
    "acute myocardial infarction",
    "congestive heart failure",
    "chronic obstructive pulmonary disease",
    "inflammatory bowel disease",
    "rheumatoid arthritis",
    "systemic lupus erythematosus",
    "multiple sclerosis",
    "parkinson disease",
    "alzheimer disease",
];

/// Single-term condition vocabulary, grouped by clinical category.
pub(crate) const CONDITIONS: &[(&str, &[&str])] = &[
    (
        "diabetes",
        &[
            "diabetes",
            "diabetes mellitus",
            "type 1 diabetes",
            "type 2 diabetes",
            "diabetic",
            "dm",
            "t2dm",
        ],
    ),
    (
        "hypertension",
        &["hypertension", "high blood pressure", "htn"],
    ),
    (
        "cancer",
        &["cancer", "carcinoma", "tumor", "neoplasm", "malignancy", "oncology"],
    ),
    (
        "breast_cancer",
        &["breast cancer", "breast carcinoma", "breast neoplasm", "triple negative"],
    ),
    (
        "lung_cancer",
        &[
            "lung cancer",
            "lung carcinoma",
            "nsclc",
            "adenocarcinoma of lung",
            "egfr mutation",
            "egfr positive",
            "brain metastases",
        ],
    ),
    (
        "colorectal_cancer",
        &["colorectal carcinoma"],
    ),
    ("prostate_cancer", &["prostate cancer", "prostate carcinoma"]),
    (
        "cardiovascular",
        &["heart disease", "cardiovascular disease", "cvd", "cad"],
    ),
    ("respiratory", &["asthma", "copd", "bronchitis"]),
    (
        "kidney",
        &["kidney disease", "renal disease", "ckd", "nephropathy"],
    ),
    ("liver", &["liver disease", "hepatitis", "cirrhosis", "hepatic"]),
    (
        "neurological",
        &["alzheimer", "parkinson", "dementia", "stroke", "epilepsy", "seizure"],
    ),
    (
        "psychiatric",
        &["depression", "anxiety", "bipolar", "schizophrenia", "ptsd"],
    ),
    ("autoimmune", &["lupus", "ms"]),
];

pub(crate) const MEDICATIONS: &[(&str, &[&str])] = &[
    (
        "diabetes",
        &["metformin", "insulin", "glipizide", "sitagliptin", "empagliflozin"],
    ),
    (
        "hypertension",
        &["lisinopril", "amlodipine", "hydrochlorothiazide", "losartan", "atenolol"],
    ),
    (
        "cholesterol",
        &["atorvastatin", "simvastatin", "rosuvastatin", "pravastatin"],
    ),
    (
        "pain",
        &["ibuprofen", "acetaminophen", "aspirin", "naproxen", "tramadol"],
    ),
    (
        "antibiotics",
        &["amoxicillin", "azithromycin", "ciprofloxacin", "doxycycline"],
    ),
    (
        "psychiatric",
        &["sertraline", "fluoxetine", "escitalopram", "aripiprazole", "quetiapine"],
    ),
    (
        "chemotherapy",
        &[
            "folfox",
            "folfiri",
            "capecitabine",
            "oxaliplatin",
            "carboplatin",
            "docetaxel",
            "paclitaxel",
        ],
    ),
    (
        "targeted_therapy",
        &[
            "erlotinib",
            "gefitinib",
            "osimertinib",
            "trastuzumab",
            "bevacizumab",
            "cetuximab",
        ],
    ),
    (
        "immunotherapy",
        &["pembrolizumab", "nivolumab", "atezolizumab", "durvalumab"],
    ),
];

pub(crate) const PROCEDURES: &[(&str, &[&str])] = &[
    (
        "surgery",
        &["surgery", "surgical procedure", "operation", "laparoscopic", "endoscopic"],
    ),
    (
        "cardiac",
        &["angioplasty", "bypass", "catheterization", "echocardiogram", "ekg", "ecg"],
    ),
    (
        "imaging",
        &["mri", "ct scan", "x-ray", "ultrasound", "pet scan", "mammogram"],
    ),
    ("biopsy", &["biopsy", "tissue sample", "pathology"]),
    (
        "transplant",
        &["transplant", "organ transplant", "bone marrow transplant"],
    ),
    (
        "treatment",
        &["immunotherapy", "chemotherapy", "radiation therapy", "targeted therapy"],
    ),
];

pub(crate) const LAB_VALUES: &[(&str, &[&str])] = &[
    (
        "diabetes",
        &["hba1c", "glucose", "blood sugar", "fasting glucose"],
    ),
    ("lipids", &["cholesterol", "ldl", "hdl", "triglycerides"]),
    ("kidney", &["creatinine", "egfr", "bun", "protein in urine"]),
    ("liver", &["alt", "ast", "bilirubin", "alkaline phosphatase"]),
    ("cardiac", &["troponin", "bnp", "nt-probnp"]),
    (
        "blood",
        &["hemoglobin", "hematocrit", "white blood cell", "platelet count"],
    ),
    (
        "biomarkers",
        &["pd-l1", "pd-1", "brca1", "brca2", "her2", "egfr", "kras"],
    ),
];

/// Abbreviations expanded during preprocessing, applied in order.
pub(crate) const ABBREVIATIONS: &[(&str, &str)] = &[
    (r"\bw/o\b", "without"),
    (r"\bw/", "with "),
    (r"\bhx\b", "history"),
    (r"\bdx\b", "diagnosis"),
    (r"\btx\b", "treatment"),
    (r"\bpt\b", "patient"),
    (r"\byrs?\b", "years"),
    (r"\bmos?\b", "months"),
];

/// Canonical forms for common condition and medication shorthand.
pub(crate) const NORMALIZATIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "condition",
        &[
            ("dm", "diabetes mellitus"),
            ("htn", "hypertension"),
            ("cad", "coronary artery disease"),
            ("cvd", "cardiovascular disease"),
            ("copd", "chronic obstructive pulmonary disease"),
            ("ckd", "chronic kidney disease"),
        ],
    ),
    (
        "medication",
        &[
            ("ace inhibitor", "ace inhibitors"),
            ("beta blocker", "beta blockers"),
            ("statin", "statins"),
        ],
    ),
];

/// Population markers recorded alongside demographics.
pub(crate) const DEMOGRAPHIC_MARKERS: &[&str] = &[
    r"\b(?:pregnant|pregnancy)\b",
    r"\b(?:nursing|breastfeeding)\b",
    r"\bchildbearing\s*age\b",
    r"\bpostmenopausal\b",
    r"\b(?:elderly|geriatric)\b",
    r"\b(?:pediatric|children)\b",
];
