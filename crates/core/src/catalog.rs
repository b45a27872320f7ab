//! Static lookup tables and the SOQL/SOSL statements built from them.

use crate::errors::ToolError;
use crate::soql::render;

pub const DEFAULT_SEARCH_OBJECTS: [&str; 4] = ["Account", "Contact", "Lead", "Opportunity"];
pub const DEFAULT_LIMIT: u32 = 20;

const FALLBACK_FIELDS: &[&str] = &["Id", "Name"];

const DEFAULT_FIELDS: &[(&str, &[&str])] = &[
    ("Account", &["Id", "Name", "Type", "Industry", "Phone", "Website", "BillingCity", "BillingState"]),
    ("Contact", &["Id", "Name", "Email", "Phone", "Title", "AccountId", "Account.Name"]),
    ("Lead", &["Id", "Name", "Email", "Phone", "Company", "Title", "Status", "Source"]),
    ("Opportunity", &["Id", "Name", "Amount", "StageName", "CloseDate", "AccountId", "Account.Name"]),
    ("Case", &["Id", "CaseNumber", "Subject", "Status", "Priority", "Origin", "AccountId"]),
];

type RelationshipTable = &'static [(&'static str, &'static str)];

const RELATIONSHIPS: &[(&str, RelationshipTable)] = &[
    (
        "Account",
        &[
            ("Contacts", "SELECT Id, Name, Email, Phone, Title FROM Contact WHERE AccountId = '{recordId}' LIMIT {limit}"),
            (
                "Opportunities",
                "SELECT Id, Name, Amount, StageName, CloseDate FROM Opportunity WHERE AccountId = '{recordId}' LIMIT {limit}",
            ),
            ("Cases", "SELECT Id, CaseNumber, Subject, Status, Priority FROM Case WHERE AccountId = '{recordId}' LIMIT {limit}"),
        ],
    ),
    (
        "Contact",
        &[
            (
                "Account",
                "SELECT Id, Name, Type, Industry FROM Account WHERE Id IN (SELECT AccountId FROM Contact WHERE Id = '{recordId}')",
            ),
            (
                "Opportunities",
                "SELECT Id, Name, Amount, StageName, CloseDate FROM Opportunity WHERE AccountId IN (SELECT AccountId FROM Contact WHERE Id = '{recordId}') LIMIT {limit}",
            ),
            ("Cases", "SELECT Id, CaseNumber, Subject, Status, Priority FROM Case WHERE ContactId = '{recordId}' LIMIT {limit}"),
        ],
    ),
    (
        "Opportunity",
        &[
            (
                "Account",
                "SELECT Id, Name, Type, Industry FROM Account WHERE Id IN (SELECT AccountId FROM Opportunity WHERE Id = '{recordId}')",
            ),
            (
                "OpportunityContactRoles",
                "SELECT Id, ContactId, Contact.Name, Role FROM OpportunityContactRole WHERE OpportunityId = '{recordId}' LIMIT {limit}",
            ),
        ],
    ),
    (
        "Lead",
        &[(
            "CampaignMembers",
            "SELECT Id, CampaignId, Campaign.Name, Status FROM CampaignMember WHERE LeadId = '{recordId}' LIMIT {limit}",
        )],
    ),
];

const HISTORY_OBJECTS: &[(&str, &str)] = &[
    ("Account", "AccountHistory"),
    ("Contact", "ContactHistory"),
    ("Lead", "LeadHistory"),
    ("Opportunity", "OpportunityHistory"),
    ("Case", "CaseHistory"),
];

const REQUIRED_CREATE_FIELDS: &[(&str, &[&str])] = &[
    ("Account", &["Name"]),
    ("Contact", &["LastName"]),
    ("Lead", &["LastName", "Company"]),
    ("Opportunity", &["Name", "StageName", "CloseDate"]),
];

const RECORD_TEMPLATE: &str = "SELECT {fields} FROM {objectType} WHERE Id = '{recordId}'";
const NAME_SEARCH_TEMPLATE: &str = "SELECT Id, Name FROM {objectType} WHERE Name LIKE '%{term}%' LIMIT {limit}";
const GLOBAL_SEARCH_TEMPLATE: &str = "FIND {{searchTerm}} IN ALL FIELDS RETURNING Account(Id, Name), \
     Contact(Id, Name, Email), Lead(Id, Name, Email, Company), Opportunity(Id, Name, Amount, StageName) \
     LIMIT {limit}";
const HISTORY_TEMPLATE: &str = "SELECT Id, Field, OldValue, NewValue, CreatedDate, CreatedById, CreatedBy.Name \
     FROM {historyObject} WHERE {parentField} = '{recordId}' ORDER BY CreatedDate DESC LIMIT {limit}";

fn lookup<'a, T: ?Sized>(table: &'a [(&str, &'a T)], key: &str) -> Option<&'a T> {
    table.iter().find(|(name, _)| *name == key).map(|(_, value)| *value)
}

/// Fields fetched by `get_record` when the caller names none.
pub fn default_fields(entity: &str) -> &'static [&'static str] {
    lookup(DEFAULT_FIELDS, entity).unwrap_or(FALLBACK_FIELDS)
}

/// Fields that must be present before a create is sent. Unknown types require nothing.
pub fn required_create_fields(entity: &str) -> &'static [&'static str] {
    lookup(REQUIRED_CREATE_FIELDS, entity).unwrap_or(&[])
}

pub fn supported_relationships(entity: &str) -> Vec<String> {
    lookup(RELATIONSHIPS, entity)
        .map(|templates| templates.iter().map(|(name, _)| name.to_string()).collect())
        .unwrap_or_default()
}

pub fn relationship_query(
    entity: &str,
    relationship: &str,
    record_id: &str,
    limit: u32,
) -> Result<String, ToolError> {
    let template = lookup(RELATIONSHIPS, entity).and_then(|templates| lookup(templates, relationship));
    let Some(template) = template else {
        return Err(ToolError::NotFound {
            message: format!("Relationship '{relationship}' not supported for {entity}"),
            supported_key: "supportedRelationships",
            supported: supported_relationships(entity),
        });
    };

    let limit = limit.to_string();
    Ok(render(template, &[("recordId", record_id), ("limit", &limit)]))
}

pub fn history_object(entity: &str) -> Result<&'static str, ToolError> {
    lookup(HISTORY_OBJECTS, entity).ok_or_else(|| ToolError::NotFound {
        message: format!("History tracking not available for {entity}"),
        supported_key: "supportedObjects",
        supported: HISTORY_OBJECTS.iter().map(|(name, _)| name.to_string()).collect(),
    })
}

pub fn history_query(entity: &str, record_id: &str, limit: u32) -> Result<String, ToolError> {
    let history_object = history_object(entity)?;
    let parent_field = format!("{entity}Id");
    let limit = limit.to_string();

    Ok(render(HISTORY_TEMPLATE, &[
        ("historyObject", history_object),
        ("parentField", &parent_field),
        ("recordId", record_id),
        ("limit", &limit),
    ]))
}

pub fn record_query(entity: &str, record_id: &str, fields: &[String]) -> String {
    let fields = fields.join(", ");
    render(RECORD_TEMPLATE, &[("fields", &fields), ("objectType", entity), ("recordId", record_id)])
}

pub fn name_search_query(entity: &str, term: &str, limit: u32) -> String {
    let limit = limit.to_string();
    render(NAME_SEARCH_TEMPLATE, &[("objectType", entity), ("term", term), ("limit", &limit)])
}

pub fn global_search_query(term: &str, limit: u32) -> String {
    let limit = limit.to_string();
    render(GLOBAL_SEARCH_TEMPLATE, &[("searchTerm", term), ("limit", &limit)])
}
